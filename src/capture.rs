//! Frame sampling: decode a video and produce JPEG frames on a fixed
//! interval grid, downscaled to the vision API's size limit.

use std::path::Path;
use std::sync::Once;

use ffmpeg::util::frame::video::Video;
use ffmpeg::{codec, decoder, format, media, software};
use ffmpeg_next::{self as ffmpeg};
use image::codecs::jpeg;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// Largest frame edge accepted by the vision API without downsampling.
pub const MAX_FRAME_EDGE: u32 = 2000;

const JPEG_QUALITY: u8 = 95;

/// Tolerance when matching decoded timestamps against the sampling grid.
const GRID_EPSILON: f64 = 1e-6;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        ffmpeg::init().unwrap();
    });
}

/// Basic properties of the input video, recorded alongside the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// One sampled frame. The JPEG payload is already downscaled to fit
/// [`MAX_FRAME_EDGE`]; `index` is 1-based.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: f64,
    pub index: usize,
    pub total: usize,
    pub jpeg: Vec<u8>,
}

/// Grid timestamps for a video of `duration` seconds sampled every
/// `interval_secs` seconds: `0, I, 2I, ..` with exactly `floor(D/I)`
/// entries. Intervals below one second are clamped to one.
pub fn sample_timestamps(duration: f64, interval_secs: u32) -> Vec<f64> {
    let interval = interval_secs.max(1) as f64;
    if duration <= 0.0 {
        return Vec::new();
    }
    let count = (duration / interval).floor() as usize;
    (0..count).map(|k| k as f64 * interval).collect()
}

/// Open the video and read its duration, frame rate and dimensions.
pub fn probe(input_path: &Path) -> Result<VideoMeta, MediaError> {
    let input = format::input(&input_path).map_err(MediaError::Open)?;
    let stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or(MediaError::NoVideoStream)?;

    let decoder = codec::context::Context::from_parameters(stream.parameters())
        .map_err(MediaError::Open)?
        .decoder()
        .video()
        .map_err(MediaError::Open)?;

    let rate = stream.avg_frame_rate();
    let fps = if rate.denominator() > 0 {
        rate.numerator() as f64 / rate.denominator() as f64
    } else {
        0.0
    };

    let duration = if input.duration() > 0 {
        input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
    } else if stream.duration() > 0 {
        let time_base: f64 = stream.time_base().into();
        stream.duration() as f64 * time_base
    } else {
        return Err(MediaError::UnknownDuration);
    };

    Ok(VideoMeta {
        duration,
        fps,
        width: decoder.width(),
        height: decoder.height(),
    })
}

/// Decode the video and sample one frame per grid timestamp. The emitted
/// timestamp is the grid value; the pixel data comes from the first decoded
/// frame at or after it. Fails without producing any frames if the video
/// cannot be opened.
pub fn sample_frames(
    input_path: &Path,
    interval_secs: u32,
) -> Result<(VideoMeta, Vec<Frame>), MediaError> {
    init();

    let meta = probe(input_path)?;
    let targets = sample_timestamps(meta.duration, interval_secs);
    let count = targets.len();
    if count == 0 {
        return Ok((meta, Vec::new()));
    }

    let mut input = format::input(&input_path).map_err(MediaError::Open)?;
    let video_stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or(MediaError::NoVideoStream)?;
    let video_stream_index = video_stream.index();
    let time_base: f64 = video_stream.time_base().into();

    let mut decoder = codec::context::Context::from_parameters(video_stream.parameters())
        .map_err(MediaError::Open)?
        .decoder()
        .video()
        .map_err(MediaError::Open)?;

    let mut scaler = software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        format::Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        software::scaling::Flags::BILINEAR,
    )
    .map_err(MediaError::Decode)?;

    let mut produced = 0usize;
    let mut frames: Vec<Frame> = Vec::with_capacity(count);
    // Returns true once every grid point has a frame.
    let mut receive_and_process_decoded_frames =
        |decoder: &mut decoder::Video| -> Result<bool, MediaError> {
            let mut decoded = Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                if produced == count {
                    break;
                }
                let Some(pts) = decoded.timestamp() else {
                    continue;
                };
                let secs = pts as f64 * time_base;
                if secs + GRID_EPSILON < targets[produced] {
                    continue;
                }

                let mut rgb_frame = Video::empty();
                scaler
                    .run(&decoded, &mut rgb_frame)
                    .map_err(MediaError::Decode)?;
                let image = frame_to_image(&rgb_frame)?;
                let jpeg = encode_jpeg(&downscale_to_fit(
                    DynamicImage::ImageRgb8(image),
                    MAX_FRAME_EDGE,
                ))?;

                // A single decoded frame may satisfy several grid points
                // when the stream's frame spacing exceeds the interval.
                while produced < count && secs + GRID_EPSILON >= targets[produced] {
                    frames.push(Frame {
                        timestamp: targets[produced],
                        index: produced + 1,
                        total: count,
                        jpeg: jpeg.clone(),
                    });
                    produced += 1;
                }
            }
            Ok(produced == count)
        };

    let mut done = false;
    for (stream, packet) in input.packets() {
        if stream.index() == video_stream_index {
            decoder.send_packet(&packet).map_err(MediaError::Decode)?;
            done = receive_and_process_decoded_frames(&mut decoder)?;
            if done {
                break;
            }
        }
    }
    if !done {
        decoder.send_eof().map_err(MediaError::Decode)?;
        receive_and_process_decoded_frames(&mut decoder)?;
    }

    if frames.is_empty() {
        return Err(MediaError::NoFrames);
    }
    Ok((meta, frames))
}

/// Copy an RGB24 frame into an [`RgbImage`], honoring the line stride.
fn frame_to_image(frame: &Video) -> Result<RgbImage, MediaError> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);

    if data.len() < stride * height as usize {
        return Err(MediaError::BadFrame);
    }

    let mut image: RgbImage = ImageBuffer::new(width, height);
    for (y, row) in data.chunks(stride).take(height as usize).enumerate() {
        for x in 0..width as usize {
            let i = x * 3;
            image.put_pixel(x as u32, y as u32, Rgb([row[i], row[i + 1], row[i + 2]]));
        }
    }
    Ok(image)
}

/// Shrink the image to fit within `max_edge` on both sides, preserving
/// aspect ratio. Images already within the box pass through untouched.
pub fn downscale_to_fit(image: DynamicImage, max_edge: u32) -> DynamicImage {
    if image.width() <= max_edge && image.height() <= max_edge {
        image
    } else {
        image.resize(max_edge, max_edge, FilterType::Lanczos3)
    }
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, MediaError> {
    let rgb = image.to_rgb8();
    let mut jpeg_data = Vec::new();
    let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, JPEG_QUALITY);
    encoder
        .encode(
            &rgb,
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(MediaError::Encode)?;
    Ok(jpeg_data)
}
