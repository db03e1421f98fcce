//! Punctum detection and regrow measurement for one fluorescence channel
//!
//! Detection runs on the unsharp-masked channel restricted to the reference
//! nucleus. The definitive punctum set comes from a second particle pass over
//! the rasterized first pass. Each punctum is then grown by a fixed margin,
//! re-thresholded at a fixed intensity floor and measured.

use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::PipelineError;
use crate::config::PipelineConfig;
use crate::image_proc::{
    analyze_particles, apply_threshold, auto_threshold, measure, rasterize, unsharp_mask,
    FilterError, IntensityStats, ParticleFilter, Roi,
};
use crate::stack::{Channel, ChannelImage};

/// Measurement of one punctum after regrow
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PunctumMeasurement {
    /// Position in the channel's definitive punctum set
    pub index: usize,
    pub stats: IntensityStats,
    /// Sub-regions found by the regrow pass; zero means the footprint itself was measured
    pub sub_regions: usize,
}

/// Everything detected and measured in one channel
#[derive(Debug, Clone)]
pub struct ChannelDetection {
    pub channel: Channel,
    /// Punctum threshold on the sharpened channel
    pub threshold: f64,
    /// Definitive punctum set, in index order
    pub puncta: Vec<Roi>,
    /// One entry per punctum, in index order
    pub measurements: Vec<PunctumMeasurement>,
}

/// Unsharp mask with the configured radius and weight
pub fn sharpen_channel(
    image: &ChannelImage,
    config: &PipelineConfig,
    max_value: f64,
) -> Result<Array2<f64>, FilterError> {
    unsharp_mask(
        &image.pixels.view(),
        config.unsharp_radius,
        config.unsharp_weight,
        max_value,
    )
}

fn punctum_filter(config: &PipelineConfig) -> ParticleFilter {
    ParticleFilter::new(config.punctum_area, config.pixel_area())
}

/// Detect the definitive punctum set inside `reference`
///
/// Returns the threshold used and the puncta in raster order.
pub fn detect_puncta(
    sharpened: ArrayView2<f64>,
    reference: &Roi,
    config: &PipelineConfig,
) -> (f64, Vec<Roi>) {
    let dim = sharpened.dim();
    let samples: Vec<f64> = reference
        .pixels()
        .filter(|&(r, c)| r < dim.0 && c < dim.1)
        .map(|(r, c)| sharpened[[r, c]])
        .collect();
    let threshold = auto_threshold(&samples, config.punctum_threshold);

    let filter = punctum_filter(config);
    let objects = apply_threshold(sharpened, threshold, f64::INFINITY);
    let first_pass = analyze_particles(objects.view(), Some(reference), &filter);
    let mask = rasterize(&first_pass, dim);
    let puncta = analyze_particles(mask.view(), None, &filter);

    debug!(
        "Punctum threshold {threshold:.1} ({}): {} first pass, {} definitive",
        config.punctum_threshold,
        first_pass.len(),
        puncta.len()
    );
    (threshold, puncta)
}

/// Grow `punctum` by the configured margin and redetect bright sub-regions inside it
///
/// Only sub-regions overlapping the punctum footprint are kept; isolated
/// background pixels above the floor inside the margin are not part of it.
pub fn regrow_punctum(image: ArrayView2<f64>, punctum: &Roi, config: &PipelineConfig) -> Vec<Roi> {
    let enlarged = punctum.enlarge(config.enlarge_pixels, image.dim());
    let objects = apply_threshold(image, config.regrow_threshold, f64::INFINITY);
    let found = analyze_particles(objects.view(), Some(&enlarged), &punctum_filter(config));
    let total = found.len();
    let kept: Vec<Roi> = found.into_iter().filter(|r| r.intersects(punctum)).collect();
    if kept.len() < total {
        debug!("Regrow dropped {} detached sub-regions", total - kept.len());
    }
    kept
}

/// Measure one punctum over the union of its regrown sub-regions
///
/// Falls back to the punctum footprint when the regrow finds nothing.
pub fn measure_punctum(
    image: ArrayView2<f64>,
    index: usize,
    punctum: &Roi,
    config: &PipelineConfig,
) -> Result<PunctumMeasurement, PipelineError> {
    let sub_regions = regrow_punctum(image, punctum, config);
    let stats = match Roi::union(&sub_regions) {
        Some(region) => measure(image, &region, config.pixel_area())?,
        None => {
            warn!("Punctum {index}: regrow found no sub-region, measuring its footprint");
            measure(image, punctum, config.pixel_area())?
        }
    };
    Ok(PunctumMeasurement {
        index,
        stats,
        sub_regions: sub_regions.len(),
    })
}

/// Sharpen, detect and measure one fluorescence channel
pub fn process_channel(
    image: &ChannelImage,
    reference: &Roi,
    config: &PipelineConfig,
    max_value: f64,
) -> Result<ChannelDetection, PipelineError> {
    let sharpened = sharpen_channel(image, config, max_value)?;
    let (threshold, puncta) = detect_puncta(sharpened.view(), reference, config);

    let measured = if config.measure_sharpened {
        sharpened.view()
    } else {
        image.pixels.view()
    };
    let measurements = puncta
        .iter()
        .enumerate()
        .map(|(index, punctum)| measure_punctum(measured, index, punctum, config))
        .collect::<Result<Vec<_>, _>>()?;

    info!("{}: {} puncta", image.channel, puncta.len());
    Ok(ChannelDetection {
        channel: image.channel,
        threshold,
        puncta,
        measurements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::{AreaRange, DisplayRange};

    fn square(row: usize, col: usize, size: usize) -> Roi {
        let pixels: Vec<_> = (row..row + size)
            .flat_map(|r| (col..col + size).map(move |c| (r, c)))
            .collect();
        Roi::from_pixels(&pixels).unwrap()
    }

    /// Dim background with bright 2x2 dots at the given corners
    fn dotted_image(dots: &[(usize, usize)]) -> Array2<f64> {
        let mut image = Array2::from_elem((40, 40), 1.0);
        for &(row, col) in dots {
            for r in row..row + 2 {
                for c in col..col + 2 {
                    image[[r, c]] = 400.0;
                }
            }
        }
        image
    }

    fn config() -> PipelineConfig {
        // 0.1 µm pixels: 2..300 px accepted
        PipelineConfig {
            pixel_size_um: Some(0.1),
            ..Default::default()
        }
    }

    #[test]
    fn test_detects_only_dots_inside_reference() {
        let image = dotted_image(&[(10, 10), (14, 20), (30, 30)]);
        let reference = square(5, 5, 20);

        let (threshold, puncta) = detect_puncta(image.view(), &reference, &config());

        assert!(threshold > 1.0 && threshold <= 400.0);
        assert_eq!(puncta.len(), 2);
        assert!(puncta[0].contains(10, 10));
        assert!(puncta[1].contains(14, 20));
    }

    #[test]
    fn test_area_range_is_calibrated() {
        let image = dotted_image(&[(10, 10)]);
        let reference = square(5, 5, 20);
        // With 1 µm pixels a 4 px dot has area 4.0, above the 3.0 limit
        let (_, puncta) = detect_puncta(image.view(), &reference, &PipelineConfig::default());
        assert!(puncta.is_empty());

        let wide = PipelineConfig {
            punctum_area: AreaRange::new(0.02, 10.0),
            ..Default::default()
        };
        let (_, puncta) = detect_puncta(image.view(), &reference, &wide);
        assert_eq!(puncta.len(), 1);
    }

    #[test]
    fn test_regrow_measures_bright_core() {
        let image = dotted_image(&[(10, 10)]);
        let punctum = square(10, 10, 2);

        let m = measure_punctum(image.view(), 0, &punctum, &config()).unwrap();

        assert_eq!(m.sub_regions, 1);
        assert_eq!(m.stats.pixel_count, 4);
        assert_eq!(m.stats.mean, 400.0);
        assert_eq!(m.stats.raw_integrated_density, 1600.0);
    }

    #[test]
    fn test_regrow_ignores_background_patches_inside_margin() {
        let mut image = dotted_image(&[(18, 18)]);
        image.mapv_inplace(|v| if v < 400.0 { 0.0 } else { v });
        // Just above the regrow floor, within 3 px of the dot but not touching it
        for row in [15, 16, 21, 22] {
            for col in [18, 19] {
                image[[row, col]] = 4.0;
            }
        }
        let punctum = square(18, 18, 2);
        let cfg = config();

        let enlarged = punctum.enlarge(cfg.enlarge_pixels, image.dim());
        let everything = apply_threshold(image.view(), cfg.regrow_threshold, f64::INFINITY);
        let all = analyze_particles(everything.view(), Some(&enlarged), &punctum_filter(&cfg));
        assert_eq!(all.len(), 3);

        let kept = regrow_punctum(image.view(), &punctum, &cfg);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].intersects(&punctum));

        let m = measure_punctum(image.view(), 0, &punctum, &cfg).unwrap();
        assert_eq!(m.sub_regions, 1);
        assert_eq!(m.stats.pixel_count, 4);
        assert_eq!(m.stats.mean, 400.0);
    }

    #[test]
    fn test_regrow_on_noisy_background_stays_bounded() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut image = Array2::from_shape_fn((40, 40), |_| rng.gen_range(0..=6) as f64);
        for r in 20..22 {
            for c in 20..22 {
                image[[r, c]] = 500.0;
            }
        }
        let reference = square(2, 2, 36);
        let cfg = config();

        let sharpened =
            unsharp_mask(&image.view(), cfg.unsharp_radius, cfg.unsharp_weight, 65535.0).unwrap();
        let (_, puncta) = detect_puncta(sharpened.view(), &reference, &cfg);

        for (index, punctum) in puncta.iter().enumerate() {
            let enlarged = punctum.enlarge(cfg.enlarge_pixels, image.dim());
            let intersecting = puncta.iter().filter(|other| other.intersects(&enlarged)).count();
            let m = measure_punctum(sharpened.view(), index, punctum, &cfg).unwrap();
            assert!(
                m.sub_regions <= intersecting,
                "punctum {index}: {} sub-regions, {intersecting} intersecting",
                m.sub_regions
            );
        }

        let dot = square(20, 20, 2);
        let m = measure_punctum(image.view(), 0, &dot, &cfg).unwrap();
        assert_eq!(m.sub_regions, 1);
        assert_eq!(m.stats.max, 500.0);
    }

    #[test]
    fn test_regrow_without_sub_region_falls_back_to_footprint() {
        // Everything below the regrow floor
        let image = Array2::from_elem((20, 20), 2.0);
        let punctum = square(8, 8, 2);

        let m = measure_punctum(image.view(), 3, &punctum, &config()).unwrap();

        assert_eq!(m.index, 3);
        assert_eq!(m.sub_regions, 0);
        assert_eq!(m.stats.pixel_count, 4);
        assert_eq!(m.stats.mean, 2.0);
    }

    #[test]
    fn test_process_channel_keeps_index_order() {
        let channel = ChannelImage {
            channel: Channel::Green,
            pixels: dotted_image(&[(8, 8), (8, 20), (20, 14)]),
            display: DisplayRange {
                min: 0.0,
                max: 400.0,
            },
        };
        let reference = square(4, 4, 24);

        let detection = process_channel(&channel, &reference, &config(), 65535.0).unwrap();

        assert_eq!(detection.channel, Channel::Green);
        assert_eq!(detection.puncta.len(), 3);
        assert_eq!(detection.measurements.len(), 3);
        for (i, m) in detection.measurements.iter().enumerate() {
            assert_eq!(m.index, i);
            assert_eq!(m.sub_regions, 1);
            assert_eq!(m.stats.pixel_count, 4);
            assert!(m.stats.mean > 400.0);
        }
        assert!(detection.measurements[0].stats.centroid_y < detection.measurements[2].stats.centroid_y);
    }
}
