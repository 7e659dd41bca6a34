use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AlignmentError {
    #[error("alignment matrix must be a signed permutation (one +-1 per row and column)")]
    NotSignedPermutation,
}

/// Fixed remap from sensor axes to device axes, `v' = R v`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAligner {
    matrix: Matrix3<f64>,
}

impl FrameAligner {
    /// Build from row-major rows; each row and column must hold exactly one +-1.
    pub fn new(rows: [[f64; 3]; 3]) -> Result<Self, AlignmentError> {
        let mut column_hits = [0usize; 3];
        for row in &rows {
            let mut row_hits = 0;
            for (col, &value) in row.iter().enumerate() {
                if value == 1.0 || value == -1.0 {
                    row_hits += 1;
                    column_hits[col] += 1;
                } else if value != 0.0 {
                    return Err(AlignmentError::NotSignedPermutation);
                }
            }
            if row_hits != 1 {
                return Err(AlignmentError::NotSignedPermutation);
            }
        }
        if column_hits != [1, 1, 1] {
            return Err(AlignmentError::NotSignedPermutation);
        }

        let [r0, r1, r2] = rows;
        Ok(Self {
            matrix: Matrix3::new(
                r0[0], r0[1], r0[2], r1[0], r1[1], r1[2], r2[0], r2[1], r2[2],
            ),
        })
    }

    pub fn apply(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * v
    }
}
