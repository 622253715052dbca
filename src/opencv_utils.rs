use image::GrayImage;
use opencv::{
    core::{self, Mat, Ptr, Vector},
    features2d::ORB,
    prelude::*,
};

use crate::{BowResult, DescriptorExtractor, DescriptorMatrix, DESC_WIDTH};

/// ORB descriptor extraction backed by opencv, with opencv's default
/// detector settings (500 features, 8 pyramid levels).
pub struct OrbExtractor {
    orb: Ptr<ORB>,
}

impl OrbExtractor {
    pub fn new() -> BowResult<Self> {
        Ok(Self {
            orb: ORB::create_def()?,
        })
    }

    fn orb_from_cvimage(&mut self, cv_img: &Mat) -> BowResult<DescriptorMatrix> {
        // Detect keypoints and compute descriptors
        let mut kps = Vector::<core::KeyPoint>::new();
        let mut desc = Mat::default();
        let mask = Mat::default();
        self.orb
            .detect_and_compute(cv_img, &mask, &mut kps, &mut desc, false)?;

        if desc.empty() {
            return Ok(DescriptorMatrix::empty(DESC_WIDTH));
        }
        // Copy data out of the opencv matrix
        let rows = desc.rows() as usize;
        let cols = desc.cols() as usize * desc.elem_size()?;
        let data = if desc.is_continuous() {
            desc.data_bytes()?.to_vec()
        } else {
            desc.try_clone()?.data_bytes()?.to_vec()
        };
        DescriptorMatrix::new(rows, cols, data)
    }
}

impl DescriptorExtractor for OrbExtractor {
    fn extract(&mut self, image: &GrayImage) -> BowResult<DescriptorMatrix> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(DescriptorMatrix::empty(DESC_WIDTH));
        }
        let cv_img = Mat::new_rows_cols_with_data(
            image.height() as i32,
            image.width() as i32,
            image.as_raw().as_slice(),
        )?;
        self.orb_from_cvimage(&*cv_img)
    }
}
