use nalgebra_sparse::CscMatrix;

/// Splits `buf` into one mutable chunk per column of a compressed layout,
/// each holding `width` values per stored entry of that column.
#[inline(always)]
pub fn split_by_offsets<'a, T>(
    mut buf: &'a mut [T],
    offsets: &[usize],
    width: usize,
) -> Vec<&'a mut [T]> {
    assert_eq!(
        buf.len(),
        offsets.last().copied().unwrap_or(0) * width,
        "buffer does not match the offsets"
    );
    let mut chunks = Vec::with_capacity(offsets.len().saturating_sub(1));
    for w in offsets.windows(2) {
        let (head, tail) = std::mem::take(&mut buf).split_at_mut((w[1] - w[0]) * width);
        chunks.push(head);
        buf = tail;
    }
    chunks
}

/// Position of entry `(row, col)` in the value array of `mat`, if stored.
#[inline(always)]
pub fn entry_position<T>(mat: &CscMatrix<T>, row: usize, col: usize) -> Option<usize> {
    let start = mat.col_offsets()[col];
    let end = mat.col_offsets()[col + 1];
    mat.row_indices()[start..end]
        .binary_search(&row)
        .ok()
        .map(|k| start + k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn test_split_by_offsets() {
        let mut buf: Vec<usize> = (0..10).collect();
        let chunks = split_by_offsets(&mut buf, &[0, 2, 2, 5], 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], &[0, 1, 2, 3]);
        assert!(chunks[1].is_empty());
        assert_eq!(chunks[2], &[4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_entry_position() {
        let mut a = CooMatrix::new(3, 3);
        a.push(0, 0, 1.0);
        a.push(2, 0, 2.0);
        a.push(1, 2, 3.0);
        let a = CscMatrix::from(&a);
        assert_eq!(entry_position(&a, 2, 0), Some(1));
        assert_eq!(entry_position(&a, 1, 2), Some(2));
        assert_eq!(entry_position(&a, 1, 0), None);
    }
}
