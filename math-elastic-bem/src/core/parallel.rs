//! Portable parallel iteration
//!
//! - `native` feature: uses rayon
//! - otherwise: falls back to sequential iteration
//!
//! Every helper returns results in input order, so parallel and sequential builds
//! produce identical output.

/// Check if parallel processing is available
#[inline]
pub fn is_parallel_available() -> bool {
    cfg!(feature = "native")
}

/// Parallel map over a range of indices
#[cfg(feature = "native")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

/// Parallel map over a range of indices
#[cfg(not(feature = "native"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

/// Parallel fallible map over a slice, stopping at an error
#[cfg(feature = "native")]
pub fn parallel_try_map<T, U, E, F>(data: &[T], f: F) -> Result<Vec<U>, E>
where
    T: Sync,
    U: Send,
    E: Send,
    F: Fn(&T) -> Result<U, E> + Sync + Send,
{
    use rayon::prelude::*;
    data.par_iter().map(f).collect()
}

/// Parallel fallible map over a slice, stopping at an error
#[cfg(not(feature = "native"))]
pub fn parallel_try_map<T, U, E, F>(data: &[T], f: F) -> Result<Vec<U>, E>
where
    F: Fn(&T) -> Result<U, E>,
{
    data.iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_map_indexed() {
        let result = parallel_map_indexed(5, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_parallel_try_map() {
        let data = vec![1, 2, 3];
        let ok: Result<Vec<i32>, String> = parallel_try_map(&data, |x| Ok(x + 1));
        assert_eq!(ok.unwrap(), vec![2, 3, 4]);
        let err: Result<Vec<i32>, String> =
            parallel_try_map(&data, |x| if *x == 2 { Err("two".into()) } else { Ok(*x) });
        assert!(err.is_err());
    }

    #[test]
    fn test_parallel_available_matches_feature() {
        assert_eq!(is_parallel_available(), cfg!(feature = "native"));
    }
}
