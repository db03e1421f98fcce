//! Channel stack acquisition
//!
//! Loads a four-channel fluorescence image either from one multi-page TIFF or
//! from four single-plane files, and splits it into named channels. Each
//! channel carries a display-only contrast range.
//!
//! TIFF inputs also yield a physical pixel size when the file is calibrated,
//! either through an ImageJ `unit=` description entry or through the
//! `ResolutionUnit` tag, combined with `XResolution`.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use shared::ImageSize;
use thiserror::Error;

use crate::image_proc::{enhance_contrast, DisplayRange};

/// Imaging channels of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// DAPI stain used to delineate the nucleus
    Nucleus,
    Green,
    Red,
    FarRed,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Nucleus, Channel::Green, Channel::Red, Channel::FarRed];

    /// Order in which channels are detected, measured and written
    pub const MEASUREMENT_ORDER: [Channel; 3] = [Channel::Red, Channel::Green, Channel::FarRed];

    /// Order in which background ovals are requested
    pub const BACKGROUND_ORDER: [Channel; 3] = [Channel::Green, Channel::Red, Channel::FarRed];

    /// Name used in the results file
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Nucleus => "Nucleus",
            Channel::Green => "Green",
            Channel::Red => "Red",
            Channel::FarRed => "FarRed",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Channel::Nucleus => 0,
            Channel::Green => 1,
            Channel::Red => 2,
            Channel::FarRed => 3,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nucleus" | "dapi" | "blue" => Ok(Channel::Nucleus),
            "green" | "gfp" => Ok(Channel::Green),
            "red" | "rfp" => Ok(Channel::Red),
            "farred" | "far-red" | "far_red" => Ok(Channel::FarRed),
            other => Err(format!("Unknown channel '{other}'")),
        }
    }
}

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Failed to open '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TIFF decoding failed: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Pixel buffer does not match image shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),
    #[error("Expected {expected} channel planes, found {found}")]
    PlaneCount { expected: usize, found: usize },
    #[error("Channel plane size {found} differs from {expected}")]
    SizeMismatch { expected: ImageSize, found: ImageSize },
    #[error("Invalid channel order: {0}")]
    ChannelOrder(String),
}

/// One named channel of a stack
#[derive(Debug, Clone)]
pub struct ChannelImage {
    pub channel: Channel,
    /// Raw sample values
    pub pixels: Array2<f64>,
    /// Display-only contrast window
    pub display: DisplayRange,
}

/// A loaded four-channel image set
#[derive(Debug, Clone)]
pub struct ChannelStack {
    /// File name of the source image, used in results and archive names
    pub title: String,
    /// Directory containing the source image
    pub parent_dir: PathBuf,
    /// Largest representable sample value (e.g. 65535 for 16-bit data)
    pub max_value: f64,
    /// Pixel width in µm read from the file, when it is calibrated
    pub pixel_size_um: Option<f64>,
    size: ImageSize,
    channels: Vec<ChannelImage>,
}

/// Check that `order` names each of the four channels exactly once
pub fn validate_channel_order(order: &[Channel]) -> Result<(), StackError> {
    if order.len() != Channel::ALL.len() {
        return Err(StackError::ChannelOrder(format!(
            "expected {} channels, got {}",
            Channel::ALL.len(),
            order.len()
        )));
    }
    for channel in Channel::ALL {
        if !order.contains(&channel) {
            return Err(StackError::ChannelOrder(format!("{channel} is missing")));
        }
    }
    Ok(())
}

impl ChannelStack {
    /// Assemble a stack from planes listed in `order`
    ///
    /// # Arguments
    /// * `title` - Source file name
    /// * `parent_dir` - Directory of the source file
    /// * `planes` - One plane per channel, in the same order as `order`
    /// * `order` - Channel identity of each plane
    /// * `max_value` - Largest representable sample value
    /// * `saturated_percent` - Contrast saturation for the display range
    pub fn from_planes(
        title: impl Into<String>,
        parent_dir: impl Into<PathBuf>,
        planes: Vec<Array2<f64>>,
        order: &[Channel],
        max_value: f64,
        saturated_percent: f64,
    ) -> Result<Self, StackError> {
        validate_channel_order(order)?;
        if planes.len() != order.len() {
            return Err(StackError::PlaneCount {
                expected: order.len(),
                found: planes.len(),
            });
        }

        let size = ImageSize::of_array(&planes[0]);
        let mut slots: Vec<Option<ChannelImage>> = vec![None, None, None, None];
        for (pixels, &channel) in planes.into_iter().zip(order) {
            let found = ImageSize::of_array(&pixels);
            if found != size {
                return Err(StackError::SizeMismatch {
                    expected: size,
                    found,
                });
            }
            let display = enhance_contrast(pixels.view(), saturated_percent);
            debug!(
                "{channel}: display range {:.1}..{:.1}",
                display.min, display.max
            );
            slots[channel.slot()] = Some(ChannelImage {
                channel,
                pixels,
                display,
            });
        }

        let channels = slots.into_iter().flatten().collect::<Vec<_>>();
        Ok(Self {
            title: title.into(),
            parent_dir: parent_dir.into(),
            max_value,
            pixel_size_um: None,
            size,
            channels,
        })
    }

    /// Attach the file calibration
    pub fn with_pixel_size(mut self, pixel_size_um: Option<f64>) -> Self {
        self.pixel_size_um = pixel_size_um;
        self
    }

    pub fn channel(&self, channel: Channel) -> &ChannelImage {
        &self.channels[channel.slot()]
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Path of the source image
    pub fn source_path(&self) -> PathBuf {
        self.parent_dir.join(&self.title)
    }
}

fn title_and_parent(path: &Path) -> (String, PathBuf) {
    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    (title, parent)
}

fn to_f64<T: Copy + Into<f64>>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter().map(Into::into).collect()
}

/// Micrometres per length unit as ImageJ names them
fn micrometres_per_unit(unit: &str) -> Option<f64> {
    match unit.trim() {
        "micron" | "microns" | "um" | "µm" | "\\u00B5m" => Some(1.0),
        "nm" => Some(1e-3),
        "mm" => Some(1e3),
        "cm" => Some(1e4),
        "m" | "meter" => Some(1e6),
        "inch" => Some(25_400.0),
        _ => None,
    }
}

/// Pixel width in µm from the resolution tags of the decoder's current page
fn tiff_pixel_size<R: Read + Seek>(
    decoder: &mut tiff::decoder::Decoder<R>,
) -> tiff::TiffResult<Option<f64>> {
    use tiff::decoder::ifd::Value;
    use tiff::tags::{ResolutionUnit, Tag};

    let pixels_per_unit = match decoder.find_tag(Tag::XResolution)? {
        Some(Value::Rational(n, d)) if n > 0 && d > 0 => n as f64 / d as f64,
        Some(Value::RationalBig(n, d)) if n > 0 && d > 0 => n as f64 / d as f64,
        _ => return Ok(None),
    };
    let described = match decoder.find_tag(Tag::ImageDescription)? {
        Some(Value::Ascii(text)) => text
            .lines()
            .find_map(|line| line.strip_prefix("unit="))
            .and_then(micrometres_per_unit),
        _ => None,
    };
    let tagged = match decoder
        .find_tag_unsigned::<u16>(Tag::ResolutionUnit)?
        .and_then(ResolutionUnit::from_u16)
    {
        Some(ResolutionUnit::Centimeter) => Some(1e4),
        Some(ResolutionUnit::Inch) => Some(25_400.0),
        _ => None,
    };
    Ok(described
        .or(tagged)
        .map(|micrometres| micrometres / pixels_per_unit))
}

fn read_calibration<R: Read + Seek>(
    decoder: &mut tiff::decoder::Decoder<R>,
    path: &Path,
) -> Option<f64> {
    match tiff_pixel_size(decoder) {
        Ok(Some(size)) => {
            info!("{}: {size:.4} µm per pixel from file calibration", path.display());
            Some(size)
        }
        Ok(None) => {
            debug!("{} carries no spatial calibration", path.display());
            None
        }
        Err(e) => {
            warn!("Ignoring unreadable calibration of {}: {e}", path.display());
            None
        }
    }
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

/// Calibration of a single-plane TIFF file, read from its first page
fn tiff_file_pixel_size(path: &Path) -> Option<f64> {
    let file = File::open(path).ok()?;
    let mut decoder = tiff::decoder::Decoder::new(BufReader::new(file)).ok()?;
    read_calibration(&mut decoder, path)
}

/// Load a multi-page grayscale TIFF, one page per channel
pub fn load_tiff_stack(
    path: &Path,
    order: &[Channel],
    saturated_percent: f64,
) -> Result<ChannelStack, StackError> {
    use tiff::decoder::{Decoder, DecodingResult};

    let file = File::open(path).map_err(|source| StackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let pixel_size = read_calibration(&mut decoder, path);

    let mut planes = Vec::new();
    let mut max_value: f64 = 0.0;
    loop {
        let (width, height) = decoder.dimensions()?;
        let bits = match decoder.colortype()? {
            tiff::ColorType::Gray(bits) => bits,
            other => return Err(StackError::UnsupportedFormat(format!("{other:?}"))),
        };

        let (values, page_max) = match decoder.read_image()? {
            DecodingResult::U8(buf) => (to_f64(buf), u8::MAX as f64),
            DecodingResult::U16(buf) => (to_f64(buf), u16::MAX as f64),
            DecodingResult::U32(buf) => (to_f64(buf), u32::MAX as f64),
            DecodingResult::F32(buf) => {
                let values = to_f64(buf);
                let max = values.iter().copied().fold(0.0, f64::max);
                (values, max)
            }
            DecodingResult::F64(buf) => {
                let max = buf.iter().copied().fold(0.0, f64::max);
                (buf, max)
            }
            _ => {
                return Err(StackError::UnsupportedFormat(format!(
                    "{bits}-bit signed samples"
                )))
            }
        };
        max_value = max_value.max(page_max);
        planes.push(Array2::from_shape_vec(
            (height as usize, width as usize),
            values,
        )?);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    info!(
        "Loaded {} TIFF pages from {}",
        planes.len(),
        path.display()
    );
    let (title, parent) = title_and_parent(path);
    Ok(
        ChannelStack::from_planes(title, parent, planes, order, max_value, saturated_percent)?
            .with_pixel_size(pixel_size),
    )
}

/// Load one single-plane image file per channel, listed in `order`
pub fn load_channel_files(
    paths: &[PathBuf],
    order: &[Channel],
    saturated_percent: f64,
) -> Result<ChannelStack, StackError> {
    let first = paths.first().ok_or(StackError::PlaneCount {
        expected: order.len(),
        found: 0,
    })?;

    let mut planes = Vec::with_capacity(paths.len());
    let mut max_value: f64 = 0.0;
    for path in paths {
        let img = image::open(path)?;
        let plane = match img.color() {
            image::ColorType::L8 | image::ColorType::La8 => {
                let gray = img.to_luma8();
                max_value = max_value.max(u8::MAX as f64);
                Array2::from_shape_fn(
                    (gray.height() as usize, gray.width() as usize),
                    |(r, c)| gray.get_pixel(c as u32, r as u32)[0] as f64,
                )
            }
            _ => {
                let gray = img.to_luma16();
                max_value = max_value.max(u16::MAX as f64);
                Array2::from_shape_fn(
                    (gray.height() as usize, gray.width() as usize),
                    |(r, c)| gray.get_pixel(c as u32, r as u32)[0] as f64,
                )
            }
        };
        debug!("Loaded {} ({})", path.display(), ImageSize::of_array(&plane));
        planes.push(plane);
    }

    let pixel_size = if is_tiff(first) {
        tiff_file_pixel_size(first)
    } else {
        None
    };
    let (title, parent) = title_and_parent(first);
    Ok(
        ChannelStack::from_planes(title, parent, planes, order, max_value, saturated_percent)?
            .with_pixel_size(pixel_size),
    )
}

/// Load either a multi-page TIFF (one path) or one file per channel
pub fn load_stack(
    paths: &[PathBuf],
    order: &[Channel],
    saturated_percent: f64,
) -> Result<ChannelStack, StackError> {
    match paths {
        [single] => load_tiff_stack(single, order, saturated_percent),
        _ => load_channel_files(paths, order, saturated_percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use approx::assert_relative_eq;
    use image::{ImageBuffer, Luma};
    use tempfile::TempDir;
    use tiff::encoder::{colortype, Rational, TiffEncoder};
    use tiff::tags::{ResolutionUnit, Tag};

    fn planes(value_offset: f64) -> Vec<Array2<f64>> {
        (0..4)
            .map(|i| Array2::from_elem((6, 8), value_offset + i as f64))
            .collect()
    }

    #[test]
    fn test_channel_parsing_and_names() {
        assert_eq!("DAPI".parse::<Channel>().unwrap(), Channel::Nucleus);
        assert_eq!("far-red".parse::<Channel>().unwrap(), Channel::FarRed);
        assert!("cyan".parse::<Channel>().is_err());
        assert_eq!(Channel::FarRed.to_string(), "FarRed");
    }

    #[test]
    fn test_from_planes_respects_order() {
        let order = [Channel::Red, Channel::Nucleus, Channel::FarRed, Channel::Green];
        let stack =
            ChannelStack::from_planes("cell.dv", "/data", planes(10.0), &order, 65535.0, 0.35)
                .unwrap();

        assert_eq!(stack.channel(Channel::Red).pixels[[0, 0]], 10.0);
        assert_eq!(stack.channel(Channel::Nucleus).pixels[[0, 0]], 11.0);
        assert_eq!(stack.channel(Channel::FarRed).pixels[[0, 0]], 12.0);
        assert_eq!(stack.channel(Channel::Green).pixels[[0, 0]], 13.0);
        assert_eq!(stack.channel(Channel::Green).channel, Channel::Green);
        assert_eq!(stack.size(), ImageSize::from_width_height(8, 6));
        assert_eq!(stack.source_path(), PathBuf::from("/data/cell.dv"));
    }

    #[test]
    fn test_invalid_orders_and_shapes() {
        let duplicate = [Channel::Red, Channel::Red, Channel::Green, Channel::Nucleus];
        assert!(matches!(
            validate_channel_order(&duplicate),
            Err(StackError::ChannelOrder(_))
        ));

        let mut bad = planes(0.0);
        bad[2] = Array2::zeros((5, 8));
        let result = ChannelStack::from_planes("x", ".", bad, &Channel::ALL, 255.0, 0.35);
        assert!(matches!(result, Err(StackError::SizeMismatch { .. })));

        let short = planes(0.0).into_iter().take(3).collect();
        let result = ChannelStack::from_planes("x", ".", short, &Channel::ALL, 255.0, 0.35);
        assert!(matches!(
            result,
            Err(StackError::PlaneCount {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_load_channel_files_16bit_png() {
        let temp = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..4u16 {
            let img: ImageBuffer<Luma<u16>, Vec<u16>> =
                ImageBuffer::from_fn(5, 3, |x, y| Luma([1000 * i + (y * 5 + x) as u16]));
            let path = temp.path().join(format!("c{i}.png"));
            img.save(&path).unwrap();
            paths.push(path);
        }

        let stack = load_stack(&paths, &Channel::ALL, 0.35).unwrap();

        assert_eq!(stack.title, "c0.png");
        assert_eq!(stack.max_value, 65535.0);
        assert_eq!(stack.size(), ImageSize::from_width_height(5, 3));
        assert_eq!(stack.channel(Channel::Red).pixels[[2, 4]], 2014.0);
    }

    #[test]
    fn test_load_multipage_tiff() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cell.01.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            for page in 0..4u16 {
                let data: Vec<u16> = (0..12).map(|i| page * 100 + i).collect();
                encoder
                    .write_image::<colortype::Gray16>(4, 3, &data)
                    .unwrap();
            }
        }

        let stack = load_stack(&[path], &Channel::ALL, 0.35).unwrap();

        assert_eq!(stack.title, "cell.01.tif");
        assert_eq!(stack.max_value, 65535.0);
        assert_eq!(stack.channel(Channel::Nucleus).pixels[[0, 1]], 1.0);
        assert_eq!(stack.channel(Channel::FarRed).pixels[[2, 3]], 311.0);
        // Encoder default is 1 pixel per unitless unit
        assert_eq!(stack.pixel_size_um, None);
    }

    fn write_calibrated_stack(path: &Path, unit: ResolutionUnit, per_unit: u32, description: Option<&str>) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        for page in 0..4u16 {
            let data: Vec<u16> = (0..12).map(|i| page * 100 + i).collect();
            let mut image = encoder.new_image::<colortype::Gray16>(4, 3).unwrap();
            image.resolution(unit, Rational { n: per_unit, d: 1 });
            if let Some(text) = description {
                image.encoder().write_tag(Tag::ImageDescription, text).unwrap();
            }
            image.write_data(&data).unwrap();
        }
    }

    #[test]
    fn test_tiff_resolution_sets_pixel_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("calibrated.tif");
        // 100000 pixels per cm: 0.1 µm pixels
        write_calibrated_stack(&path, ResolutionUnit::Centimeter, 100_000, None);

        let stack = load_stack(&[path], &Channel::ALL, 0.35).unwrap();

        assert_relative_eq!(stack.pixel_size_um.unwrap(), 0.1, epsilon = 1e-12);
        let config = PipelineConfig::default().calibrated(stack.pixel_size_um);
        assert_relative_eq!(config.pixel_area(), 0.01, epsilon = 1e-12);
        // A 2x2 punctum now falls inside the 0.02..3.0 µm² range
        assert!(config.punctum_area.contains(4.0 * config.pixel_area()));
    }

    #[test]
    fn test_imagej_unit_description_sets_pixel_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("imagej.tif");
        write_calibrated_stack(
            &path,
            ResolutionUnit::None,
            20,
            Some("ImageJ=1.54f\nimages=4\nchannels=4\nunit=micron\n"),
        );

        let stack = load_stack(&[path], &Channel::ALL, 0.35).unwrap();

        assert_relative_eq!(stack.pixel_size_um.unwrap(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_imagej_pixel_unit_is_uncalibrated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pixels.tif");
        write_calibrated_stack(&path, ResolutionUnit::None, 1, Some("ImageJ=1.54f\nunit=pixel\n"));

        let stack = load_stack(&[path], &Channel::ALL, 0.35).unwrap();

        assert_eq!(stack.pixel_size_um, None);
    }

    #[test]
    fn test_single_page_tiff_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("flat.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            encoder
                .write_image::<colortype::Gray8>(2, 2, &[1, 2, 3, 4])
                .unwrap();
        }

        let result = load_stack(&[path], &Channel::ALL, 0.35);
        assert!(matches!(
            result,
            Err(StackError::PlaneCount {
                expected: 4,
                found: 1
            })
        ));
    }

    #[test]
    fn test_missing_tiff_reports_path() {
        let result = load_stack(&[PathBuf::from("/nonexistent/stack.tif")], &Channel::ALL, 0.35);
        match result {
            Err(StackError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/stack.tif"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
