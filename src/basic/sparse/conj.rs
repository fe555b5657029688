use nalgebra::{Complex, Scalar};
use nalgebra_sparse::{CscMatrix, SparseFormatError};

/// Trait for extracting the real and imaginary parts of a matrix.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real and imaginary parts of the matrix, sharing its pattern.
    fn real_imag(&self) -> Result<(Self::Mat, Self::Mat), SparseFormatError>;
}

impl<T: Scalar + Copy> RealImage for CscMatrix<Complex<T>> {
    type Mat = CscMatrix<T>;

    fn real_imag(&self) -> Result<(Self::Mat, Self::Mat), SparseFormatError> {
        let (re, im): (Vec<T>, Vec<T>) = self.values().iter().map(|v| (v.re, v.im)).unzip();
        let real_mat = CscMatrix::try_from_pattern_and_values(self.pattern().clone(), re)?;
        let imag_mat = CscMatrix::try_from_pattern_and_values(self.pattern().clone(), im)?;
        Ok((real_mat, imag_mat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn test_real_imag() {
        let mut a = CooMatrix::new(4, 4);
        a.push(0, 0, Complex::new(1.0, -1.0));
        a.push(2, 1, Complex::new(3.0, 1.0));
        a.push(3, 3, Complex::new(5.0, -2.0));
        let a: CscMatrix<_> = (&a).into();
        let (re, im) = a.real_imag().unwrap();
        assert_eq!(re.pattern(), a.pattern(), "patterns do not match!");
        assert_eq!(re.values(), &[1.0, 3.0, 5.0]);
        assert_eq!(im.values(), &[-1.0, 1.0, -2.0]);
    }
}
