//! Builds a few tiny trees and writes their structural dumps to stdout, so
//! the split and promotion behaviour is visible at a glance.
//!
//! Run with: `cargo run --example structure`

use std::error::Error;
use std::io::stdout;

use typenum::U2;

use btree_lab::{BPlusTreeMap, BTreeMap, LinearLazy};

fn main() -> Result<(), Box<dyn Error>> {
    let mut out = stdout().lock();

    println!("B-tree, capacity 2, keys 1..=7 ascending:");
    let mut btree = BTreeMap::<u64, u64, U2>::new();
    for k in 1..=7 {
        btree.put(k, k * 10)?;
    }
    btree.validate();
    btree.print(&mut out)?;
    println!("depth = {}, len = {}", btree.depth(), btree.len());

    println!();
    println!("B+-tree, capacities 2/2, keys 1..=7 ascending:");
    let mut bptree = BPlusTreeMap::<u64, u64, U2, U2>::new();
    for k in 1..=7 {
        bptree.put(k, k * 10)?;
    }
    bptree.validate();
    bptree.print(&mut out)?;
    println!("depth = {}, len = {}", bptree.depth(), bptree.len());

    println!();
    println!("B+-tree with lazy leaves, before any split:");
    let mut lazy = BPlusTreeMap::<u64, u64, typenum::U8, U2, btree_lab::Linear, LinearLazy>::new();
    for k in [5, 2, 7, 1, 6] {
        lazy.put(k, k * 10)?;
    }
    lazy.validate();
    lazy.print(&mut out)?;
    println!("depth = {}, len = {}", lazy.depth(), lazy.len());

    Ok(())
}
