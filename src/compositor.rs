//! Merges two half-page prints onto one 4R sheet.
//!
//! Vertical halves sit side by side, horizontal halves are stacked. Each input
//! is scaled to fill its half of the sheet, then the sheet is written as a JPEG
//! into the merge directory for the printer gateway to pick up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use thiserror::Error;

use crate::job::Orientation;

pub const PRINT_DPI: f64 = 300.0;
pub const MM_PER_INCH: f64 = 25.4;
/// 4R sheet, portrait.
pub const SHEET_WIDTH_MM: f64 = 101.6;
pub const SHEET_HEIGHT_MM: f64 = 152.4;

pub fn mm_to_px(mm: f64) -> u32 {
    ((mm / MM_PER_INCH) * PRINT_DPI).round() as u32
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Cannot encode merged print {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Merge task failed: {0}")]
    Task(String),
}

/// Pixel dimensions of the output sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub width: u32,
    pub height: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            width: mm_to_px(SHEET_WIDTH_MM),
            height: mm_to_px(SHEET_HEIGHT_MM),
        }
    }
}

impl SheetLayout {
    /// Size of one half of the sheet.
    pub fn cell(&self, orientation: Orientation) -> (u32, u32) {
        match orientation {
            Orientation::Vertical => (self.width / 2, self.height),
            Orientation::Horizontal => (self.width, self.height / 2),
        }
    }

    /// Top-left corner of the second half.
    pub fn second_origin(&self, orientation: Orientation) -> (u32, u32) {
        match orientation {
            Orientation::Vertical => (self.width / 2, 0),
            Orientation::Horizontal => (0, self.height / 2),
        }
    }
}

#[async_trait]
pub trait Compositor: Send + Sync {
    /// Produce one full sheet from two half-page images and return its path.
    async fn merge(
        &self,
        first: &Path,
        second: &Path,
        orientation: Orientation,
    ) -> Result<PathBuf, CompositeError>;
}

fn fit_cell(image: DynamicImage, (width, height): (u32, u32)) -> RgbImage {
    if image.width() == width && image.height() == height {
        image.to_rgb8()
    } else {
        image.resize_to_fill(width, height, FilterType::Lanczos3).to_rgb8()
    }
}

/// Lay two decoded images out on a white sheet.
pub fn compose(
    first: DynamicImage,
    second: DynamicImage,
    orientation: Orientation,
    layout: SheetLayout,
) -> RgbImage {
    let cell = layout.cell(orientation);
    let mut sheet = RgbImage::from_pixel(layout.width, layout.height, Rgb([255, 255, 255]));
    let (x, y) = layout.second_origin(orientation);
    imageops::overlay(&mut sheet, &fit_cell(first, cell), 0, 0);
    imageops::overlay(&mut sheet, &fit_cell(second, cell), i64::from(x), i64::from(y));
    sheet
}

fn open_source(path: &Path) -> Result<DynamicImage, CompositeError> {
    image::open(path).map_err(|source| CompositeError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Compositor backed by the `image` crate, writing JPEGs to `output_dir`.
#[derive(Debug, Clone)]
pub struct ImageCompositor {
    output_dir: PathBuf,
    layout: SheetLayout,
}

impl ImageCompositor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout: SheetLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: SheetLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn merge_blocking(
        first: PathBuf,
        second: PathBuf,
        orientation: Orientation,
        layout: SheetLayout,
        output_dir: PathBuf,
    ) -> Result<PathBuf, CompositeError> {
        let first = open_source(&first)?;
        let second = open_source(&second)?;
        let sheet = compose(first, second, orientation, layout);

        std::fs::create_dir_all(&output_dir)?;
        let out = output_dir.join(format!("merged_print_{}.jpg", uuid::Uuid::new_v4()));
        sheet
            .save_with_format(&out, ImageFormat::Jpeg)
            .map_err(|source| CompositeError::Encode {
                path: out.clone(),
                source,
            })?;
        Ok(out)
    }
}

#[async_trait]
impl Compositor for ImageCompositor {
    async fn merge(
        &self,
        first: &Path,
        second: &Path,
        orientation: Orientation,
    ) -> Result<PathBuf, CompositeError> {
        let first = first.to_path_buf();
        let second = second.to_path_buf();
        let layout = self.layout;
        let output_dir = self.output_dir.clone();
        let out = tokio::task::spawn_blocking(move || {
            Self::merge_blocking(first, second, orientation, layout, output_dir)
        })
        .await
        .map_err(|e| CompositeError::Task(e.to_string()))??;
        tracing::debug!(path = %out.display(), %orientation, "Merged half-page prints");
        Ok(out)
    }
}
