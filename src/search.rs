//! Lower-bound search strategies over a node's packed key array.
//!
//! Node search is the hot loop of every map operation, and the best strategy
//! depends on the fan-out: plain linear scans win for narrow nodes, the
//! branchless variants trade instruction count for predictability, and
//! bisection pays off once nodes hold dozens of keys. Strategies are
//! zero-sized marker types picked as map type parameters, so the choice is
//! made at compile time and the search code monomorphises into the tree.
//!
//! Every strategy receives the live prefix of a node's key array (never the
//! uninitialised padding behind `key_count`) and the search key.

use core::borrow::Borrow;
use core::marker::PhantomData;

use typenum::{Unsigned, U8};

/// A lower-bound search over a sorted key slice.
///
/// `lower_bound` returns the first index whose key is not less than
/// `key`, or `keys.len()` if every key is smaller.
pub trait Search {
    fn lower_bound<K, Q>(keys: &[K], key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized;
}

/// Search over a leaf's key array, which is allowed to be unsorted under
/// the lazy leaf policy.
///
/// `find` returns `(index, true)` for the slot holding an equal key, or
/// `(insertion_hint, false)` when the key is absent. For sorted strategies
/// the hint is the lower bound; for [`LinearLazy`] it is `keys.len()`
/// (lazy inserts always append).
pub trait LeafSearch {
    /// Whether leaves searched with this strategy keep their keys sorted on
    /// every insertion.
    const SORTED: bool;

    fn find<K, Q>(keys: &[K], key: &Q) -> (usize, bool)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized;
}

/// Every sorted lower-bound strategy doubles as a leaf strategy: search,
/// then test the returned slot for equality.
impl<S: Search> LeafSearch for S {
    const SORTED: bool = true;

    #[inline]
    fn find<K, Q>(keys: &[K], key: &Q) -> (usize, bool)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let i = S::lower_bound(keys, key);
        (i, i < keys.len() && keys[i].borrow() == key)
    }
}

/// Forward scan; stops at the first key that is not less than the search
/// key. Predictable and hard to beat for small fan-outs.
pub struct Linear;

impl Search for Linear {
    #[inline]
    fn lower_bound<K, Q>(keys: &[K], key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        keys.iter()
            .position(|k| k.borrow() >= key)
            .unwrap_or(keys.len())
    }
}

/// Scan from the high end, folding each comparison into a two-element index
/// table instead of a conditional branch. Every slot is visited, so the
/// iteration count does not depend on the key.
pub struct LinearBranchless;

impl Search for LinearBranchless {
    #[inline]
    fn lower_bound<K, Q>(keys: &[K], key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut i = keys.len();
        let mut j = keys.len();
        while j > 0 {
            j -= 1;
            i = [i, j][usize::from(keys[j].borrow() >= key)];
        }
        i
    }
}

/// Bisection with the per-step branch folded into a two-element base table,
/// finished by a single boolean correction.
pub struct BinaryBranchless;

impl Search for BinaryBranchless {
    #[inline]
    fn lower_bound<K, Q>(keys: &[K], key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if keys.is_empty() {
            return 0;
        }
        let mut base = 0usize;
        let mut size = keys.len();
        while size > 1 {
            let half = size / 2;
            let mid = base + half;
            base = [base, mid][usize::from(keys[mid].borrow() < key)];
            size -= half;
        }
        base + usize::from(keys[base].borrow() < key)
    }
}

/// Bisection while the remaining window is wider than `Cutoff`, then a
/// forward scan inside the window.
pub struct Dynamic<Cutoff: Unsigned = U8>(PhantomData<Cutoff>);

impl<Cutoff: Unsigned> Search for Dynamic<Cutoff> {
    #[inline]
    fn lower_bound<K, Q>(keys: &[K], key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let cutoff = Cutoff::USIZE.max(1);
        let mut base = 0usize;
        let mut size = keys.len();
        while size > cutoff {
            let half = size / 2;
            let mid = base + half;
            base = [base, mid][usize::from(keys[mid].borrow() < key)];
            size -= half;
        }
        // The lower bound now lies in [base, base + size].
        base + Linear::lower_bound(&keys[base..base + size], key)
    }
}

/// Equality scan for lazily ordered leaves.
///
/// This is not a lower-bound search: it only answers "which slot holds this
/// key, if any", which is the only question an unsorted leaf can answer.
/// Selecting it as a map's leaf strategy is what switches that map's leaves
/// to lazy ordering.
pub struct LinearLazy;

impl LeafSearch for LinearLazy {
    const SORTED: bool = false;

    #[inline]
    fn find<K, Q>(keys: &[K], key: &Q) -> (usize, bool)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match keys.iter().position(|k| k.borrow() == key) {
            Some(i) => (i, true),
            None => (keys.len(), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use typenum::{U1, U3};

    use super::*;

    fn reference(keys: &[u64], key: u64) -> usize {
        keys.partition_point(|k| *k < key)
    }

    fn check_all(keys: &[u64], key: u64) {
        let want = reference(keys, key);
        assert_eq!(Linear::lower_bound(keys, &key), want, "linear {keys:?} {key}");
        assert_eq!(
            LinearBranchless::lower_bound(keys, &key),
            want,
            "linear-branchless {keys:?} {key}"
        );
        assert_eq!(
            BinaryBranchless::lower_bound(keys, &key),
            want,
            "binary-branchless {keys:?} {key}"
        );
        assert_eq!(
            Dynamic::<U3>::lower_bound(keys, &key),
            want,
            "dynamic/3 {keys:?} {key}"
        );
        assert_eq!(
            Dynamic::<U1>::lower_bound(keys, &key),
            want,
            "dynamic/1 {keys:?} {key}"
        );
    }

    #[test]
    fn test_empty_slice() {
        check_all(&[], 42);
    }

    #[test]
    fn test_all_strategies_agree() {
        let keys: &[u64] = &[2, 4, 6, 8, 10, 12, 14, 16, 18];
        for key in 0..20 {
            check_all(keys, key);
        }
        for n in 0..keys.len() {
            for key in 0..20 {
                check_all(&keys[..n], key);
            }
        }
    }

    #[test]
    fn test_duplicate_free_bounds() {
        check_all(&[5], 4);
        check_all(&[5], 5);
        check_all(&[5], 6);
        check_all(&[1, 2], 0);
        check_all(&[1, 2], 3);
    }

    #[test]
    fn test_sorted_leaf_find() {
        let keys: &[u64] = &[1, 3, 5];
        assert_eq!(<Linear as LeafSearch>::find(keys, &3), (1, true));
        assert_eq!(<Linear as LeafSearch>::find(keys, &4), (2, false));
        assert_eq!(<BinaryBranchless as LeafSearch>::find(keys, &6), (3, false));
        assert_eq!(<BinaryBranchless as LeafSearch>::find(keys, &1), (0, true));
    }

    #[test]
    fn test_lazy_find_ignores_order() {
        let keys: &[u64] = &[9, 2, 7, 4];
        assert_eq!(LinearLazy::find(keys, &7), (2, true));
        assert_eq!(LinearLazy::find(keys, &9), (0, true));
        assert_eq!(LinearLazy::find(keys, &3), (4, false));
        assert!(!<LinearLazy as LeafSearch>::SORTED);
        assert!(<Linear as LeafSearch>::SORTED);
    }
}
