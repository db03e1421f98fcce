//! Background sampling over operator-drawn ovals

use log::info;
use serde::{Deserialize, Serialize};

use super::PipelineError;
use crate::image_proc::{mean_intensity, Oval, Roi};
use crate::selection::SelectionProvider;
use crate::stack::{Channel, ChannelImage, ChannelStack};

/// Mean background intensity of each fluorescence channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSamples {
    pub green: f64,
    pub red: f64,
    pub far_red: f64,
}

impl BackgroundSamples {
    pub fn get(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Green => Some(self.green),
            Channel::Red => Some(self.red),
            Channel::FarRed => Some(self.far_red),
            Channel::Nucleus => None,
        }
    }
}

/// Mean intensity of `image` inside `oval`; every pixel value counts
pub fn sample_background(image: &ChannelImage, oval: &Oval) -> Result<f64, PipelineError> {
    let roi = Roi::from_oval(oval, image.pixels.dim())
        .ok_or(PipelineError::EmptyRegion(image.channel))?;
    Ok(mean_intensity(image.pixels.view(), &roi)?)
}

/// Ask for one oval per fluorescence channel, Green then Red then FarRed
pub fn sample_backgrounds(
    stack: &ChannelStack,
    provider: &mut dyn SelectionProvider,
) -> Result<BackgroundSamples, PipelineError> {
    let mut values = [0.0; 3];
    for (slot, channel) in Channel::BACKGROUND_ORDER.into_iter().enumerate() {
        let image = stack.channel(channel);
        let oval = provider.background_oval(channel, image)?;
        values[slot] = sample_background(image, &oval)?;
        info!("{channel} background = {:.3}", values[slot]);
    }
    Ok(BackgroundSamples {
        green: values[0],
        red: values[1],
        far_red: values[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::DisplayRange;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn channel_with(pixels: Array2<f64>) -> ChannelImage {
        ChannelImage {
            channel: Channel::Red,
            pixels,
            display: DisplayRange { min: 0.0, max: 1.0 },
        }
    }

    #[test]
    fn test_background_mean_over_oval() {
        let mut pixels = Array2::from_elem((20, 20), 10.0);
        // Bright spot well outside the oval
        pixels[[18, 18]] = 5000.0;
        let image = channel_with(pixels);
        let oval = Oval {
            x: 2.0,
            y: 2.0,
            width: 6.0,
            height: 4.0,
        };
        assert_relative_eq!(sample_background(&image, &oval).unwrap(), 10.0);
    }

    #[test]
    fn test_oval_outside_image_is_empty_region() {
        let image = channel_with(Array2::zeros((10, 10)));
        let oval = Oval {
            x: 50.0,
            y: 50.0,
            width: 4.0,
            height: 4.0,
        };
        assert!(matches!(
            sample_background(&image, &oval),
            Err(PipelineError::EmptyRegion(Channel::Red))
        ));
    }

    #[test]
    fn test_samples_lookup() {
        let samples = BackgroundSamples {
            green: 1.0,
            red: 2.0,
            far_red: 3.0,
        };
        assert_eq!(samples.get(Channel::FarRed), Some(3.0));
        assert_eq!(samples.get(Channel::Nucleus), None);
    }
}
