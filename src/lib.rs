//! A complete JPEG codec: ITU-T T.81 in all its processes plus the
//! JPEG-LS (T.87) sequential mode.
//!
//! Both coding directions are covered: baseline and extended
//! sequential DCT, progressive DCT, the lossless predictive
//! processes, every arithmetic coded variant, the differential frames
//! of hierarchical images, restart markers, DNL, 12 and 16 bit
//! precisions, and JPEG-LS in its three interleave shapes.
//!
//! ```no_run
//! use omni_jpeg::{Decoder, Encoder, EncoderOptions, ColorSpace, SOFMarkers};
//!
//! // decode
//! let mut decoder = Decoder::new();
//! let pixels = decoder.decode_file("image.jpg").unwrap();
//!
//! // encode losslessly
//! let options = EncoderOptions::new()
//!     .set_scan_type(SOFMarkers::LosslessHuffman)
//!     .set_predictor(4);
//! let mut encoder = Encoder::new_with_options(options);
//! let bytes = encoder
//!     .encode(&pixels, 640, 480, ColorSpace::RGB)
//!     .unwrap();
//! ```
#![allow(
    clippy::needless_return,
    clippy::similar_names,
    clippy::inline_always,
    clippy::doc_markdown,
    clippy::module_name_repetitions
)]
#![warn(clippy::correctness, clippy::perf, clippy::pedantic)]
#[macro_use]
extern crate log;

pub use crate::decoder::{Decoder, ImageInfo};
pub use crate::encoder::Encoder;
pub use crate::errors::{ErrorKind, JpgError, JpgResult};
pub use crate::misc::{ColorSpace, SOFMarkers};
pub use crate::options::{DecoderOptions, EncoderOptions};

pub mod bitstream;
pub mod bytestream;
pub mod errors;
pub mod huffman;
pub mod markers;
pub mod qmcoder;

mod bitmap;
mod blockbuffer;
mod color_convert;
mod components;
mod decoder;
mod encoder;
mod frame;
mod headers;
mod hierarchical;
mod idct;
mod lineadapter;
mod linebuffer;
mod linemerger;
mod misc;
mod options;
mod predictor;
mod scans;
mod tables;
mod upsampler;
