//! Search primitives over key-ordered sequences.
//!
//! All three functions operate on a strictly key-ordered slice of
//! key-bearing elements, with `key_of` extracting the key to compare. The
//! needle itself does not need to reside in the sequence, which allows
//! searching sparse sequences such as the separator list of an internal
//! node.

/// Find the index of the element whose key equals `needle`
pub fn binary_search<T, K, F>(haystack: &[T], needle: &K, key_of: F) -> Option<usize>
where
    K: Ord,
    F: Fn(&T) -> &K,
{
    haystack.binary_search_by(|element| key_of(element).cmp(needle)).ok()
}

/// Find the index of the greatest element whose key does not exceed
/// `needle`, or `None` if the needle is smaller than all elements
pub fn greatest_not_exceeding<T, K, F>(haystack: &[T], needle: &K, key_of: F) -> Option<usize>
where
    K: Ord,
    F: Fn(&T) -> &K,
{
    let first_larger = haystack.partition_point(|element| key_of(element) <= needle);
    first_larger.checked_sub(1)
}

/// Find the index of the smallest element whose key is larger than
/// `needle`, or `None` if no such element exists. An element equal to the
/// needle is not larger; the slot after it is returned.
pub fn next_largest<T, K, F>(haystack: &[T], needle: &K, key_of: F) -> Option<usize>
where
    K: Ord,
    F: Fn(&T) -> &K,
{
    let first_larger = haystack.partition_point(|element| key_of(element) <= needle);
    if first_larger < haystack.len() {
        Some(first_larger)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SearchKey, KEY_SIZE};

    fn key(last: u8) -> SearchKey {
        let mut key: SearchKey = [0; KEY_SIZE];
        key[0] = 57;
        key[1] = 5;
        key[KEY_SIZE - 1] = last;
        key
    }

    fn haystack() -> Vec<SearchKey> {
        vec![key(2), key(5), key(12), key(18)]
    }

    #[test]
    fn test_binary_search() {
        let keys = haystack();

        for (i, k) in keys.iter().enumerate() {
            assert_eq!(binary_search(&keys, k, |k| k), Some(i));
        }

        assert_eq!(binary_search(&keys, &key(0), |k| k), None);
        assert_eq!(binary_search(&keys, &key(6), |k| k), None);
        assert_eq!(binary_search(&keys, &key(19), |k| k), None);
    }

    #[test]
    fn test_greatest_not_exceeding() {
        let keys = haystack();

        assert_eq!(greatest_not_exceeding(&keys, &key(1), |k| k), None);
        assert_eq!(greatest_not_exceeding(&keys, &key(2), |k| k), Some(0));
        assert_eq!(greatest_not_exceeding(&keys, &key(3), |k| k), Some(0));
        assert_eq!(greatest_not_exceeding(&keys, &key(12), |k| k), Some(2));
        assert_eq!(greatest_not_exceeding(&keys, &key(17), |k| k), Some(2));
        assert_eq!(greatest_not_exceeding(&keys, &key(19), |k| k), Some(3));
    }

    #[test]
    fn test_next_largest() {
        let keys = haystack();

        assert_eq!(next_largest(&keys, &key(1), |k| k), Some(0));
        assert_eq!(next_largest(&keys, &key(3), |k| k), Some(1));
        assert_eq!(next_largest(&keys, &key(10), |k| k), Some(2));
        assert_eq!(next_largest(&keys, &key(15), |k| k), Some(3));
        assert_eq!(next_largest(&keys, &key(19), |k| k), None);
    }

    #[test]
    fn test_next_largest_skips_equal_needle() {
        let keys = haystack();
        assert_eq!(next_largest(&keys, &key(5), |k| k), Some(2));
        assert_eq!(next_largest(&keys, &key(18), |k| k), None);
    }
}
