//! Operand generation and the exact reference product.
//!
//! Matrices are drawn from the small alphabet `0..TOP_VALUE` with the
//! configured probability mass on zero and the remainder uniform, the
//! distribution the sparsity experiments sweep over.

use ndarray::{Array3, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

/// Exclusive upper bound of the operand alphabet.
pub const TOP_VALUE: i64 = 10;

/// Draw a `threads×rows×cols` operand tensor.  `sparsity` is the
/// probability of a zero cell; the remaining mass is uniform over
/// `1..TOP_VALUE`.
pub fn sparse_batch(
    rng: &mut StdRng,
    threads: usize,
    rows: usize,
    cols: usize,
    sparsity: f64,
) -> Result<Array3<i64>, String> {
    let mut weights = vec![(1.0 - sparsity) / (TOP_VALUE - 1) as f64; TOP_VALUE as usize];
    weights[0] = sparsity;
    let alphabet =
        WeightedIndex::new(&weights).map_err(|e| format!("bad sparsity {sparsity}: {e}"))?;

    Ok(Array3::from_shape_fn((threads, rows, cols), |_| {
        alphabet.sample(rng) as i64
    }))
}

/// Exact integer batched product `west @ north`: one `N×N` matrix product
/// per thread.
pub fn matmul_batch(west: &Array3<i64>, north: &Array3<i64>) -> Array3<i64> {
    let (threads, rows, _) = west.dim();
    let (_, _, cols) = north.dim();
    let mut out = Array3::zeros((threads, rows, cols));
    for t in 0..threads {
        let product = west
            .index_axis(Axis(0), t)
            .dot(&north.index_axis(Axis(0), t));
        out.index_axis_mut(Axis(0), t).assign(&product);
    }
    out
}
