//! Dense integral operator for small problems and validation
//!
//! Every triangle pair is integrated with the far rule, then the near-field correction is
//! added on top. The result is the operator an FMM would apply, stored densely.

use ndarray::{Array1, Array2};

use super::nearfield::{AssemblyStats, NearfieldAssembler, dof_index, far_field_blocks};
use crate::core::error::{NearfieldError, Result};
use crate::core::evaluator::row_tensor;
use crate::core::types::{Triangle, tensor_index};

/// Dense operator of one kernel on one mesh
#[derive(Debug, Clone)]
pub struct DenseIntegralOp {
    /// Operator matrix, rows and columns `tri * 9 + basis * 3 + component`
    pub matrix: Array2<f64>,
    /// Statistics of the near-field part
    pub stats: AssemblyStats,
}

impl DenseIntegralOp {
    /// Assemble far field for all pairs plus the near-field correction
    pub fn build(assembler: &NearfieldAssembler) -> Result<Self> {
        let tris = assembler.triangles();
        let n = assembler.num_dofs();
        let pairs: Vec<(Triangle, Triangle)> = tris
            .iter()
            .flat_map(|o| tris.iter().map(move |s| (*o, *s)))
            .collect();
        log::info!(
            "Dense {} operator: {} pairs, {} dofs",
            assembler.kernel(),
            pairs.len(),
            n
        );

        let far = far_field_blocks(
            assembler.kernel(),
            assembler.points(),
            &pairs,
            assembler.params(),
            assembler.far_order(),
            assembler.evaluator(),
        )?;

        let mut matrix = Array2::zeros((n, n));
        for i in 0..tris.len() {
            for j in 0..tris.len() {
                let block = row_tensor(&far, i * tris.len() + j)?;
                for a in 0..3 {
                    for c in 0..3 {
                        for b in 0..3 {
                            for d in 0..3 {
                                matrix[[dof_index(i, a, c), dof_index(j, b, d)]] =
                                    block[tensor_index(a, c, b, d)];
                            }
                        }
                    }
                }
            }
        }

        let (correction, stats) = assembler.assemble()?;
        correction.add_to_dense(&mut matrix)?;
        Ok(Self { matrix, stats })
    }

    /// Number of rows and columns
    pub fn num_dofs(&self) -> usize {
        self.matrix.nrows()
    }

    /// Apply the operator
    pub fn dot(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        if x.len() != self.num_dofs() {
            return Err(NearfieldError::invalid(format!(
                "operator has {} dofs, vector has {}",
                self.num_dofs(),
                x.len()
            )));
        }
        Ok(self.matrix.dot(x))
    }
}
