use std::path::Path;

use image::GrayImage;

use crate::*;

/// Something that turns a grayscale image into a descriptor matrix.
///
/// An image without detectable keypoints yields a matrix with zero rows,
/// not an error.
pub trait DescriptorExtractor {
    fn extract(&mut self, image: &GrayImage) -> BowResult<DescriptorMatrix>;
}

impl<F> DescriptorExtractor for F
where
    F: FnMut(&GrayImage) -> BowResult<DescriptorMatrix>,
{
    fn extract(&mut self, image: &GrayImage) -> BowResult<DescriptorMatrix> {
        self(image)
    }
}

/// Decode an image file as single-channel 8-bit intensity data.
pub fn load_gray<P: AsRef<Path>>(path: P) -> image::ImageResult<GrayImage> {
    Ok(image::open(path)?.to_luma8())
}
