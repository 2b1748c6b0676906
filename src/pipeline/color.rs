// Dominant-color extraction for the embedding stage (spec §4.4 stage 3):
// decode a sampled frame, run a small-k clustering over a pixel sample, and
// bucket each cluster center into one of the 11 named categories so color
// search terms ("red car") have something to match against.

use crate::error::{EngineError, Result};
use crate::vocab::bucket_rgb;
use std::path::Path;

const K: usize = 3;
const MAX_SAMPLES: usize = 2_000;
const KMEANS_ITERATIONS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct DominantColor {
    pub category: &'static str,
    pub weight: f64,
}

/// Decode `frame_path` and return up to `K` dominant color categories,
/// weighted by the share of sampled pixels assigned to each cluster.
/// Categories repeat if distinct clusters land in the same bucket; callers
/// that want a deduplicated top set should merge by category themselves.
pub fn extract_dominant_colors(frame_path: &Path) -> Result<Vec<DominantColor>> {
    let img = image::open(frame_path)
        .map_err(|e| EngineError::Other(format!("decoding frame for color extraction: {}", e)))?
        .into_rgb8();

    let pixels: Vec<[f64; 3]> = sample_pixels(&img, MAX_SAMPLES);
    if pixels.is_empty() {
        return Ok(Vec::new());
    }

    let centroids = kmeans(&pixels, K.min(pixels.len()), KMEANS_ITERATIONS);
    let mut counts = vec![0usize; centroids.len()];
    for p in &pixels {
        let idx = nearest_centroid(p, &centroids);
        counts[idx] += 1;
    }

    let total = pixels.len() as f64;
    let mut colors: Vec<DominantColor> = centroids
        .iter()
        .zip(counts.iter())
        .filter(|(_, &count)| count > 0)
        .map(|(c, &count)| DominantColor {
            category: bucket_rgb(c[0] as u8, c[1] as u8, c[2] as u8),
            weight: count as f64 / total,
        })
        .collect();

    colors.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    Ok(colors)
}

fn sample_pixels(img: &image::RgbImage, max_samples: usize) -> Vec<[f64; 3]> {
    let (w, h) = img.dimensions();
    let total_pixels = (w as usize) * (h as usize);
    if total_pixels == 0 {
        return Vec::new();
    }
    let stride = (total_pixels / max_samples).max(1);

    img.pixels()
        .step_by(stride)
        .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
        .collect()
}

fn nearest_centroid(p: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    centroids
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| squared_dist(p, a).partial_cmp(&squared_dist(p, b)).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn squared_dist(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|i| (a[i] - b[i]).powi(2)).sum()
}

/// Lloyd's-algorithm k-means with deterministic seeding (evenly spaced
/// samples rather than random picks, so results are reproducible across
/// runs of the same frame).
fn kmeans(pixels: &[[f64; 3]], k: usize, iterations: usize) -> Vec<[f64; 3]> {
    if k == 0 || pixels.is_empty() {
        return Vec::new();
    }
    let step = (pixels.len() / k).max(1);
    let mut centroids: Vec<[f64; 3]> = (0..k).map(|i| pixels[(i * step).min(pixels.len() - 1)]).collect();

    for _ in 0..iterations {
        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];

        for p in pixels {
            let idx = nearest_centroid(p, &centroids);
            for c in 0..3 {
                sums[idx][c] += p[c];
            }
            counts[idx] += 1;
        }

        for i in 0..k {
            if counts[i] > 0 {
                for c in 0..3 {
                    centroids[i][c] = sums[i][c] / counts[i] as f64;
                }
            }
        }
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_solid_jpeg(dir: &Path, name: &str, rgb: [u8; 3]) -> std::path::PathBuf {
        let mut img = RgbImage::new(16, 16);
        for p in img.pixels_mut() {
            *p = Rgb(rgb);
        }
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn solid_red_frame_is_dominated_by_red() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_solid_jpeg(dir.path(), "red.jpg", [220, 20, 20]);
        let colors = extract_dominant_colors(&path).unwrap();
        assert!(!colors.is_empty());
        assert_eq!(colors[0].category, "red");
        assert!(colors[0].weight > 0.9);
    }

    #[test]
    fn solid_white_frame_is_dominated_by_white() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_solid_jpeg(dir.path(), "white.jpg", [250, 248, 245]);
        let colors = extract_dominant_colors(&path).unwrap();
        assert_eq!(colors[0].category, "white");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = extract_dominant_colors(Path::new("/nonexistent/frame.jpg"));
        assert!(result.is_err());
    }
}
