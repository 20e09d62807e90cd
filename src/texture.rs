use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use crate::error::Result;
use crate::gls::{GraphicsState, TextureFilter, TextureId, TextureParam, TextureWrap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Uploaded {
    generation: u64,
    id: TextureId,
}

/// A 2D RGBA texture.
///
/// Pixels stay on the CPU so the texture can be uploaded again after the
/// graphics context is replaced. Upload happens on first [`bind`](Self::bind).
#[derive(Debug)]
pub struct Texture2D {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    min_filter: TextureFilter,
    mag_filter: TextureFilter,
    wrap_s: TextureWrap,
    wrap_t: TextureWrap,
    mipmaps: bool,
    gpu: Mutex<Option<Uploaded>>,
}

impl Texture2D {
    /// Creates a texture from raw RGBA data.
    ///
    /// # Panics
    ///
    /// If `pixels` is not exactly `width * height * 4` bytes.
    pub fn from_rgba(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "rgba buffer does not match {width}x{height}"
        );
        Self {
            pixels,
            width,
            height,
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::Repeat,
            wrap_t: TextureWrap::Repeat,
            mipmaps: false,
            gpu: Mutex::new(None),
        }
    }

    /// Decodes an encoded image (PNG, JPEG...) from memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(img.into_raw(), width, height))
    }

    /// Loads and decodes an image file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(img.into_raw(), width, height))
    }

    /// Single-color 1×1 texture.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::from_rgba(rgba.to_vec(), 1, 1)
    }

    /// Two-tone checkerboard with `cell`-pixel squares, filtered with nearest sampling.
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell) + (y / cell)) % 2 == 0;
                pixels.extend_from_slice(if even { &a } else { &b });
            }
        }
        Self::from_rgba(pixels, size, size).filter(TextureFilter::Nearest, TextureFilter::Nearest)
    }

    pub fn filter(mut self, min: TextureFilter, mag: TextureFilter) -> Self {
        self.min_filter = min;
        self.mag_filter = mag;
        self
    }

    pub fn wrap(mut self, s: TextureWrap, t: TextureWrap) -> Self {
        self.wrap_s = s;
        self.wrap_t = t;
        self
    }

    /// Generates mipmaps on upload and switches minification to trilinear.
    pub fn with_mipmaps(mut self) -> Self {
        self.mipmaps = true;
        self.min_filter = TextureFilter::LinearMipmapLinear;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.lock().is_some()
    }

    /// Binds the texture on `unit`, uploading first if needed.
    pub fn bind(&self, state: &mut GraphicsState, unit: u32) -> Result<()> {
        state.active_texture(unit);
        let mut gpu = self.gpu.lock();
        match *gpu {
            Some(up) if up.generation == state.generation() => {
                state.bind_texture_2d(Some(up.id));
            }
            _ => {
                let id = state.create_texture()?;
                state.bind_texture_2d(Some(id));
                state.tex_image_2d_rgba(self.width, self.height, &self.pixels);
                state.tex_parameter(TextureParam::MinFilter(self.min_filter));
                state.tex_parameter(TextureParam::MagFilter(self.mag_filter));
                state.tex_parameter(TextureParam::WrapS(self.wrap_s));
                state.tex_parameter(TextureParam::WrapT(self.wrap_t));
                if self.mipmaps {
                    state.generate_mipmap();
                }
                debug!("uploaded {}x{} texture as {:?}", self.width, self.height, id);
                *gpu = Some(Uploaded {
                    generation: state.generation(),
                    id,
                });
            }
        }
        Ok(())
    }

    /// Deletes the GPU texture. The texture uploads again if bound later.
    pub fn dispose(&self, state: &mut GraphicsState) {
        if let Some(up) = self.gpu.lock().take()
            && up.generation == state.generation()
        {
            state.delete_texture(up.id);
        }
    }
}
