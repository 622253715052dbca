use crate::*;

/// Row-major descriptor matrix as handed out by an extractor:
/// one row per keypoint, `cols` bytes per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorMatrix {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl DescriptorMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<u8>) -> BowResult<Self> {
        if rows * cols != data.len() {
            return Err(BowErr::MatrixShape {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Matrix with no keypoints. This is what an extractor returns for
    /// an image without detectable features.
    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    /// Stack descriptors into a matrix, mostly useful for fake extractors.
    pub fn from_descs(descs: &[Desc]) -> Self {
        Self {
            rows: descs.len(),
            cols: DESC_WIDTH,
            data: descs.iter().flatten().copied().collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, i: usize) -> Option<&[u8]> {
        if i >= self.rows {
            return None;
        }
        Some(&self.data[i * self.cols..(i + 1) * self.cols])
    }

    /// Split the matrix into one descriptor per row, keeping row order.
    ///
    /// Every row is copied into its own `Desc`, so the result does not
    /// borrow from the matrix and stays valid after it is dropped.
    pub fn split_rows(&self) -> BowResult<ImageDescriptors> {
        if self.rows == 0 {
            return Ok(Vec::new());
        }
        if self.cols != DESC_WIDTH {
            return Err(BowErr::DescriptorWidth {
                expected: DESC_WIDTH,
                found: self.cols,
            });
        }
        self.data
            .chunks_exact(DESC_WIDTH)
            .map(|row| {
                row.try_into().map_err(|_| BowErr::DescriptorWidth {
                    expected: DESC_WIDTH,
                    found: row.len(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(rows: usize) -> Vec<u8> {
        (0..rows * DESC_WIDTH).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn split_keeps_rows_in_order() {
        let m = DescriptorMatrix::new(5, DESC_WIDTH, patterned(5)).unwrap();
        let descs = m.split_rows().unwrap();
        assert_eq!(descs.len(), 5);
        for (i, d) in descs.iter().enumerate() {
            assert_eq!(&d[..], m.row(i).unwrap());
        }
    }

    #[test]
    fn rows_outlive_the_matrix() {
        let data = patterned(3);
        let expected: Vec<Vec<u8>> = data.chunks(DESC_WIDTH).map(|c| c.to_vec()).collect();
        let descs = {
            let m = DescriptorMatrix::new(3, DESC_WIDTH, data).unwrap();
            m.split_rows().unwrap()
        };
        for (d, e) in descs.iter().zip(&expected) {
            assert_eq!(&d[..], &e[..]);
        }
    }

    #[test]
    fn zero_rows_is_empty_set() {
        assert!(DescriptorMatrix::empty(DESC_WIDTH)
            .split_rows()
            .unwrap()
            .is_empty());
        // width does not matter when there is nothing to split
        assert!(DescriptorMatrix::empty(61).split_rows().unwrap().is_empty());
    }

    #[test]
    fn wrong_width_is_rejected() {
        let m = DescriptorMatrix::new(2, 16, vec![0; 32]).unwrap();
        assert!(matches!(
            m.split_rows(),
            Err(BowErr::DescriptorWidth {
                expected: 32,
                found: 16
            })
        ));
    }

    #[test]
    fn shape_must_match_data() {
        assert!(matches!(
            DescriptorMatrix::new(2, DESC_WIDTH, vec![0; 10]),
            Err(BowErr::MatrixShape { .. })
        ));
    }

    #[test]
    fn from_descs_round_trips_rows() {
        let descs = vec![[1u8; 32], [2u8; 32]];
        let m = DescriptorMatrix::from_descs(&descs);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.split_rows().unwrap(), descs);
    }
}
