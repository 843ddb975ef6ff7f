//! Cycle-count benchmark over the tree maps and the standard library's
//! maps.
//!
//! Every operation is timed individually with the CPU timestamp counter and
//! folded into per-size histogram bins (one bin per power of two of map
//! size), so the output shows how cost grows with occupancy rather than one
//! blended average. Workloads: insert into a missing key, insert into a
//! present key, amortised lookup over every present key, individual lookup
//! hits, lookup misses, and the final drop.
//!
//! Run with: `cargo run --release --example cycle-bench [log2_count]`

use std::collections::{BTreeMap as StdBTreeMap, HashMap};

use typenum::{U16, U32};

use btree_lab::{BPlusTreeMap, BTreeMap, BinaryBranchless, LinearLazy};

#[cfg(target_arch = "x86_64")]
#[inline]
fn cycles() -> u64 {
    let mut aux = 0u32;
    // SAFETY: rdtscp is unprivileged on x86-64.
    unsafe { core::arch::x86_64::__rdtscp(&mut aux) }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn cycles() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new() -> Self {
        XorShift64 { state: 123456789 }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

#[derive(Clone)]
struct Bin {
    min: u64,
    max: u64,
    sum: u64,
    count: u64,
}

impl Bin {
    fn new() -> Self {
        Bin {
            min: u64::MAX,
            max: 0,
            sum: 0,
            count: 0,
        }
    }

    fn record(&mut self, sample: u64) {
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.sum += sample;
        self.count += 1;
    }

    fn mean(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum.div_ceil(self.count)
        }
    }
}

/// Samples bucketed by the map size at measurement time, one bin per power
/// of two.
struct Histogram {
    bins: Vec<Bin>,
}

impl Histogram {
    fn new(log_count: usize) -> Self {
        Histogram {
            bins: vec![Bin::new(); log_count + 1],
        }
    }

    fn bin_for(&mut self, map_len: usize) -> &mut Bin {
        let ix = (usize::BITS - map_len.leading_zeros()) as usize;
        let len = self.bins.len();
        &mut self.bins[ix.min(len - 1)]
    }

    fn print(&self, label: &str) {
        println!("{label}");
        self.row("min", |b| b.min);
        self.row("avg", |b| b.mean());
        self.row("max", |b| b.max);
    }

    fn row(&self, tag: &str, pick: impl Fn(&Bin) -> u64) {
        print!("{tag} =");
        for bin in &self.bins {
            if bin.count == 0 {
                print!(" {:>9}", "-");
            } else {
                print!(" {:>9}", pick(bin));
            }
        }
        println!();
    }
}

struct Metrics {
    insert_miss: Histogram,
    insert_hit: Histogram,
    lookup_hit_all: Histogram,
    lookup_hit_one: Histogram,
    lookup_miss: Histogram,
    free: Histogram,
}

impl Metrics {
    fn new(log_count: usize) -> Self {
        Metrics {
            insert_miss: Histogram::new(log_count),
            insert_hit: Histogram::new(log_count),
            lookup_hit_all: Histogram::new(log_count),
            lookup_hit_one: Histogram::new(log_count),
            lookup_miss: Histogram::new(log_count),
            free: Histogram::new(log_count),
        }
    }

    fn print(&self) {
        self.insert_miss.print("insert_miss");
        self.insert_hit.print("insert_hit");
        self.lookup_hit_all.print("lookup_hit_all (amortised)");
        self.lookup_hit_one.print("lookup_hit_one");
        self.lookup_miss.print("lookup_miss");
        self.free.print("free");
    }
}

/// The uniform surface the driver needs from each map under test.
trait Subject {
    fn fresh() -> Self;
    fn store(&mut self, k: u64, v: u64);
    fn fetch(&self, k: &u64) -> bool;
    fn size(&self) -> usize;
}

impl Subject for BTreeMap<u64, u64, U16, BinaryBranchless, BinaryBranchless> {
    fn fresh() -> Self {
        Self::new()
    }
    fn store(&mut self, k: u64, v: u64) {
        self.put(k, v).expect("allocation failed");
    }
    fn fetch(&self, k: &u64) -> bool {
        self.get(k).is_some()
    }
    fn size(&self) -> usize {
        self.len()
    }
}

impl Subject for BPlusTreeMap<u64, u64, U32, U16, BinaryBranchless, BinaryBranchless> {
    fn fresh() -> Self {
        Self::new()
    }
    fn store(&mut self, k: u64, v: u64) {
        self.put(k, v).expect("allocation failed");
    }
    fn fetch(&self, k: &u64) -> bool {
        self.get(k).is_some()
    }
    fn size(&self) -> usize {
        self.len()
    }
}

impl Subject for BPlusTreeMap<u64, u64, U32, U16, BinaryBranchless, LinearLazy> {
    fn fresh() -> Self {
        Self::new()
    }
    fn store(&mut self, k: u64, v: u64) {
        self.put(k, v).expect("allocation failed");
    }
    fn fetch(&self, k: &u64) -> bool {
        self.get(k).is_some()
    }
    fn size(&self) -> usize {
        self.len()
    }
}

impl Subject for StdBTreeMap<u64, u64> {
    fn fresh() -> Self {
        Self::new()
    }
    fn store(&mut self, k: u64, v: u64) {
        self.insert(k, v);
    }
    fn fetch(&self, k: &u64) -> bool {
        self.get(k).is_some()
    }
    fn size(&self) -> usize {
        self.len()
    }
}

impl Subject for HashMap<u64, u64> {
    fn fresh() -> Self {
        Self::new()
    }
    fn store(&mut self, k: u64, v: u64) {
        self.insert(k, v);
    }
    fn fetch(&self, k: &u64) -> bool {
        self.get(k).is_some()
    }
    fn size(&self) -> usize {
        self.len()
    }
}

fn bench_one<S: Subject>(rng: &mut XorShift64, log_count_one: usize, metrics: &mut Metrics) {
    let count = 1usize << log_count_one;

    let keys: Vec<u64> = (0..count).map(|_| rng.next()).collect();
    let missing: Vec<u64> = (0..count).map(|_| rng.next()).collect();
    let values: Vec<u64> = (0..count).map(|i| keys[(i + 1) % count]).collect();

    let mut map = S::fresh();
    assert_eq!(map.size(), 0);

    for (k, v) in keys.iter().zip(&values) {
        let before = cycles();
        map.store(*k, *v);
        let after = cycles();
        metrics.insert_miss.bin_for(map.size()).record(after - before);
    }

    for (k, v) in keys.iter().zip(&values) {
        let before = cycles();
        map.store(*k, *v);
        let after = cycles();
        metrics.insert_hit.bin_for(map.size()).record(after - before);
    }

    {
        let before = cycles();
        for k in &keys {
            assert!(map.fetch(k), "present key went missing");
        }
        let after = cycles();
        metrics
            .lookup_hit_all
            .bin_for(map.size())
            .record((after - before) / count as u64);
    }

    for k in &keys {
        let before = cycles();
        let hit = map.fetch(k);
        let after = cycles();
        metrics.lookup_hit_one.bin_for(map.size()).record(after - before);
        assert!(hit, "present key went missing");
    }

    for k in &missing {
        let before = cycles();
        let hit = map.fetch(k);
        let after = cycles();
        metrics.lookup_miss.bin_for(map.size()).record(after - before);
        assert!(!hit, "phantom key reported present");
    }

    let len = map.size();
    let before = cycles();
    drop(map);
    let after = cycles();
    metrics.free.bin_for(len).record(after - before);
}

fn bench<S: Subject>(name: &str, log_count: usize) {
    println!();
    println!("{name}:");
    let mut rng = XorShift64::new();
    let mut metrics = Metrics::new(log_count);
    for log_count_one in 0..log_count {
        // Smaller maps get proportionally more repetitions so every bin
        // sees a comparable number of samples.
        for _ in 0..(1usize << (log_count - log_count_one)) {
            bench_one::<S>(&mut rng, log_count_one, &mut metrics);
        }
    }
    metrics.print();
}

fn main() {
    let log_count = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(14usize);

    bench::<BTreeMap<u64, u64, U16, BinaryBranchless, BinaryBranchless>>("BTreeMap/16", log_count);
    bench::<BPlusTreeMap<u64, u64, U32, U16, BinaryBranchless, BinaryBranchless>>(
        "BPlusTreeMap/32+16 strict",
        log_count,
    );
    bench::<BPlusTreeMap<u64, u64, U32, U16, BinaryBranchless, LinearLazy>>(
        "BPlusTreeMap/32+16 lazy",
        log_count,
    );
    bench::<StdBTreeMap<u64, u64>>("std BTreeMap", log_count);
    bench::<HashMap<u64, u64>>("std HashMap (sip)", log_count);
}
