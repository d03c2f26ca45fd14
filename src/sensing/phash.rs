use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

const HASH_SIZE: u32 = 16;

/// Perceptual fingerprint of a frame: a 16x16 mean hash (256 bits).
///
/// Only used for distance comparison; it cannot reproduce the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    hash: ImageHash,
}

impl Fingerprint {
    pub fn of(image: &DynamicImage) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .hash_size(HASH_SIZE, HASH_SIZE)
            .to_hasher();

        Self {
            hash: hasher.hash_image(image),
        }
    }

    pub fn bit_len(&self) -> usize {
        self.hash.as_bytes().len() * 8
    }

    /// Hamming distance normalized to `[0, 1]`. Symmetric; identical images
    /// give exactly 0. Fingerprints of different sizes are maximally distant.
    pub fn distance(&self, other: &Fingerprint) -> f64 {
        let bits = self.bit_len();
        if bits == 0 || bits != other.bit_len() {
            return 1.0;
        }
        f64::from(self.hash.dist(&other.hash)) / bits as f64
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, Rgba, RgbaImage};

    /// Left half black, right half white (or mirrored).
    pub fn split(width: u32, height: u32, white_on_right: bool) -> DynamicImage {
        let image = RgbaImage::from_fn(width, height, |x, _| {
            let right = x >= width / 2;
            if right == white_on_right {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        DynamicImage::ImageRgba8(image)
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::split;
    use super::*;

    #[test]
    fn identical_images_have_zero_distance() {
        let a = Fingerprint::of(&split(128, 96, true));
        let b = Fingerprint::of(&split(128, 96, true));
        assert_eq!(a.distance(&b), 0.0);
        assert_eq!(a.bit_len(), 256);
    }

    #[test]
    fn mirrored_layout_is_far_apart_and_symmetric() {
        let a = Fingerprint::of(&split(128, 96, true));
        let b = Fingerprint::of(&split(128, 96, false));
        let forward = a.distance(&b);
        assert!(forward > 0.5, "distance was {forward}");
        assert_eq!(forward, b.distance(&a));
    }
}
