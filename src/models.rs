//! Error matrix model and its free-parameter layout.
//!
//! In general mode all nine entries of `Ma` are free. In common-axis mode the
//! sensor axes are assumed orthogonal: entries below the diagonal are fixed
//! to zero and only the six upper-triangular entries are estimated.

use nalgebra::DVector;

use crate::types::{ErrorMatrix, ParamVector};

const GENERAL_ENTRIES: [(usize, usize); 9] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (1, 0),
    (1, 1),
    (1, 2),
    (2, 0),
    (2, 1),
    (2, 2),
];

const COMMON_AXIS_ENTRIES: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

/// Maps an [`ErrorMatrix`] to and from its free-parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    common_axis: bool,
}

impl ParameterLayout {
    pub fn new(common_axis: bool) -> Self {
        Self { common_axis }
    }

    pub fn is_common_axis(&self) -> bool {
        self.common_axis
    }

    /// Free `(row, column)` entries, in parameter order (row-major).
    pub fn entries(&self) -> &'static [(usize, usize)] {
        if self.common_axis {
            &COMMON_AXIS_ENTRIES
        } else {
            &GENERAL_ENTRIES
        }
    }

    /// Number of free parameters.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn to_params(&self, ma: &ErrorMatrix) -> ParamVector {
        DVector::from_iterator(self.len(), self.entries().iter().map(|&(r, c)| ma[(r, c)]))
    }

    /// Rebuilds the matrix; fixed entries are zero.
    pub fn from_params(&self, params: &ParamVector) -> ErrorMatrix {
        let mut ma = ErrorMatrix::zeros();
        for (&(r, c), value) in self.entries().iter().zip(params.iter()) {
            ma[(r, c)] = *value;
        }
        ma
    }

    /// Projects a matrix onto the layout by zeroing its fixed entries.
    pub fn constrain(&self, ma: &ErrorMatrix) -> ErrorMatrix {
        self.from_params(&self.to_params(ma))
    }
}

/// Scale factor and cross-coupling views of an [`ErrorMatrix`].
pub trait ErrorMatrixExt {
    /// Scale factor errors `(sx, sy, sz)`.
    fn scale_factors(&self) -> [f64; 3];
    /// Cross-coupling errors `(mxy, mxz, myx, myz, mzx, mzy)`.
    fn cross_coupling(&self) -> [f64; 6];
    /// True when no entry below the diagonal is set.
    fn is_upper_triangular(&self) -> bool;
}

impl ErrorMatrixExt for ErrorMatrix {
    fn scale_factors(&self) -> [f64; 3] {
        [self[(0, 0)], self[(1, 1)], self[(2, 2)]]
    }

    fn cross_coupling(&self) -> [f64; 6] {
        [
            self[(0, 1)],
            self[(0, 2)],
            self[(1, 0)],
            self[(1, 2)],
            self[(2, 0)],
            self[(2, 1)],
        ]
    }

    fn is_upper_triangular(&self) -> bool {
        self[(1, 0)] == 0.0 && self[(2, 0)] == 0.0 && self[(2, 1)] == 0.0
    }
}
