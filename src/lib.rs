//! Audio feature extraction and shaping for music-reactive visuals.
//!
//! Local sources (microphone, media file, WAV replay) run spectral feature
//! extraction and beat detection; remote tracks are synthesized from
//! analysis data. Either way the [`audio::SourceRouter`] shapes the result
//! into a [`audio::FeatureSnapshot`] with every value in [0,1].

pub mod audio;
pub mod config;
