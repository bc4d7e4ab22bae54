use crate::error::OctreeError;
use nalgebra::Complex;

/// Expansion coefficients `(m, n)` with `-order <= m <= order` and
/// `0 <= n <= order`.
///
/// `m` is folded onto rows `2|m| - (m > 0)`, so `m = 0, 1, -1, 2, -2, ...`
/// map to rows `0, 1, 2, 3, 4, ...`.
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients {
    order: usize,
    data: Vec<Complex<f64>>,
    is_zero: bool,
}

impl Coefficients {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            data: vec![Complex::new(0.0, 0.0); (2 * order + 1) * (order + 1)],
            is_zero: true,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// True until a non-zero value is written.
    pub fn is_zero(&self) -> bool {
        self.is_zero
    }

    fn index(&self, m: i64, n: i64) -> Option<usize> {
        let row = m.unsigned_abs().checked_mul(2)? - u64::from(m > 0);
        let cols = self.order + 1;
        let row = usize::try_from(row).ok()?;
        let n = usize::try_from(n).ok()?;
        (row < 2 * self.order + 1 && n < cols).then_some(row * cols + n)
    }

    /// Zero outside the stored range.
    pub fn get(&self, m: i64, n: i64) -> Complex<f64> {
        self.index(m, n)
            .map_or(Complex::new(0.0, 0.0), |i| self.data[i])
    }

    pub fn set(&mut self, m: i64, n: i64, value: Complex<f64>) -> Result<(), OctreeError> {
        if !(value.re.is_finite() && value.im.is_finite()) {
            return Err(OctreeError::NonFinite { m, n });
        }
        let i = self.index(m, n).ok_or(OctreeError::CoefficientOutOfRange {
            m,
            n,
            order: self.order,
        })?;
        self.data[i] = value;
        if value != Complex::new(0.0, 0.0) {
            self.is_zero = false;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.fill(Complex::new(0.0, 0.0));
        self.is_zero = true;
    }
}
