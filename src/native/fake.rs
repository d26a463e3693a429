//! In-memory backend for unit tests
//!
//! Encoded "files" are a real `ftyp` box followed by a `FAKE` marker and an
//! index into the backend's store, so brand sniffing and truncation checks
//! behave like they do for real files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use whereat::at;

use super::{
    Backend, DecodeSettings, EncodableImage, EncodeSettings, HandleInfo, ItemId, ItemRef,
    NativeContext, NativeWriter,
};
use crate::brand::CompressionFormat;
use crate::color::ColorProfile;
use crate::convert::{convert_plane, scale_plane};
use crate::error::{Error, HeifError, Result, subcode};
use crate::marshal::PlaneBuf;
use crate::metadata::MetadataBlock;
use crate::mode::{Layout, Mode};

const MARKER: &[u8; 4] = b"FAKE";
const FILE_LEN: usize = 32;

#[derive(Debug, Clone)]
pub(crate) struct FakeItem {
    pub info: HandleInfo,
    pub mode: Mode,
    pub plane: PlaneBuf,
    pub thumbnails: Vec<FakeItem>,
}

impl FakeItem {
    pub fn new(id: ItemId, mode: Mode, plane: PlaneBuf) -> Self {
        Self {
            info: HandleInfo {
                id,
                width: plane.width(),
                height: plane.height(),
                has_alpha: mode.has_alpha(),
                luma_bits: mode.bit_depth(),
                thumbnail_ids: Vec::new(),
                metadata: Vec::new(),
                color_profile: ColorProfile::None,
            },
            mode,
            plane,
            thumbnails: Vec::new(),
        }
    }

    pub fn with_thumbnail(mut self, thumb: FakeItem) -> Self {
        self.info.thumbnail_ids.push(thumb.info.id);
        self.thumbnails.push(thumb);
        self
    }

    pub fn with_metadata(mut self, block: MetadataBlock) -> Self {
        self.info.metadata.push(block);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeFile {
    pub brand: [u8; 4],
    pub items: Vec<FakeItem>,
    pub primary: ItemId,
}

#[derive(Debug, Default)]
struct Shared {
    files: Mutex<Vec<FakeFile>>,
    opened_with: Mutex<Option<DecodeSettings>>,
    decodes: AtomicUsize,
    delay: Duration,
    decoded_size: Option<(u32, u32)>,
    no_encoder: bool,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeBackend {
    shared: Arc<Shared>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes sleep for `delay`, widening race windows
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                delay,
                ..Shared::default()
            }),
        }
    }

    /// Decodes return planes of `size`, regardless of the header
    pub fn with_decoded_size(size: (u32, u32)) -> Self {
        Self {
            shared: Arc::new(Shared {
                decoded_size: Some(size),
                ..Shared::default()
            }),
        }
    }

    /// A backend that can decode but has no encoders
    pub fn decode_only() -> Self {
        Self {
            shared: Arc::new(Shared {
                no_encoder: true,
                ..Shared::default()
            }),
        }
    }

    pub fn arc(&self) -> Arc<dyn Backend> {
        Arc::new(self.clone())
    }

    /// Settings of the most recent `open`
    pub fn opened_with(&self) -> Option<DecodeSettings> {
        self.shared
            .opened_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn decode_count(&self) -> usize {
        self.shared.decodes.load(Ordering::SeqCst)
    }

    /// Store a file and return its encoded bytes
    pub fn store(&self, file: FakeFile) -> Vec<u8> {
        let mut files = self.shared.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.push(file);
        let index = (files.len() - 1) as u32;
        let brand = files[index as usize].brand;
        encode_file_bytes(&brand, index)
    }

    pub fn file(&self, bytes: &[u8]) -> Option<FakeFile> {
        let index = file_index(bytes).ok()?;
        let files = self.shared.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.get(index).cloned()
    }
}

fn encode_file_bytes(brand: &[u8; 4], index: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(FILE_LEN);
    out.extend_from_slice(&24u32.to_be_bytes());
    out.extend_from_slice(b"ftyp");
    out.extend_from_slice(brand);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(b"mif1");
    out.extend_from_slice(brand);
    out.extend_from_slice(MARKER);
    out.extend_from_slice(&index.to_le_bytes());
    out
}

fn file_index(data: &[u8]) -> Result<usize> {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return Err(at(Error::from(HeifError::invalid_input(
            subcode::NO_FTYP_BOX,
            "No 'ftyp' box",
        ))));
    }
    if data.len() < FILE_LEN || &data[24..28] != MARKER {
        return Err(at(Error::from(HeifError::invalid_input(
            subcode::END_OF_DATA,
            "Unexpected end of file",
        ))));
    }
    let mut index = [0u8; 4];
    index.copy_from_slice(&data[28..32]);
    Ok(u32::from_le_bytes(index) as usize)
}

impl Backend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn open(&self, data: Vec<u8>, settings: &DecodeSettings) -> Result<Arc<dyn NativeContext>> {
        *self
            .shared
            .opened_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        let index = file_index(&data)?;
        let files = self.shared.files.lock().unwrap_or_else(PoisonError::into_inner);
        let file = files.get(index).cloned().ok_or_else(|| {
            at(Error::from(HeifError::invalid_input(
                subcode::END_OF_DATA,
                "Unknown file",
            )))
        })?;
        Ok(Arc::new(FakeContext {
            file,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn writer(&self, settings: &EncodeSettings) -> Result<Box<dyn NativeWriter>> {
        if self.shared.no_encoder {
            return Err(at(Error::from(HeifError::no_encoder())));
        }
        let brand = match settings.format {
            CompressionFormat::Hevc => *b"heic",
            CompressionFormat::Av1 => *b"avif",
        };
        Ok(Box::new(FakeWriter {
            backend: self.clone(),
            file: FakeFile {
                brand,
                items: Vec::new(),
                primary: 0,
            },
            next_id: 1,
        }))
    }

    fn has_encoder(&self, _format: CompressionFormat) -> bool {
        !self.shared.no_encoder
    }
}

struct FakeContext {
    file: FakeFile,
    shared: Arc<Shared>,
}

impl FakeContext {
    fn find(&self, item: ItemRef) -> Result<&FakeItem> {
        let missing = || {
            at(Error::from(HeifError::usage(
                subcode::UNSPECIFIED,
                format!("No item {}", item.id()),
            )))
        };
        let image_id = match item {
            ItemRef::Image(id) => id,
            ItemRef::Thumbnail { image, .. } => image,
        };
        let image = self
            .file
            .items
            .iter()
            .find(|i| i.info.id == image_id)
            .ok_or_else(missing)?;
        match item {
            ItemRef::Image(_) => Ok(image),
            ItemRef::Thumbnail { thumbnail, .. } => image
                .thumbnails
                .iter()
                .find(|t| t.info.id == thumbnail)
                .ok_or_else(missing),
        }
    }
}

fn gray_to_rgb(plane: &PlaneBuf, mode: Mode) -> Result<(PlaneBuf, Mode)> {
    let rgb = Mode::new(Layout::Rgb, mode.bit_depth())?;
    let sample = mode.bytes_per_sample();
    let mut out = PlaneBuf::zeroed(plane.width(), plane.height(), rgb.bytes_per_pixel(), None)?;
    for (src, dst) in plane.rows().zip(out.rows_mut()) {
        for (s, d) in src.chunks_exact(sample).zip(dst.chunks_exact_mut(sample * 3)) {
            for c in 0..3 {
                d[c * sample..(c + 1) * sample].copy_from_slice(s);
            }
        }
    }
    Ok((out, rgb))
}

impl NativeContext for FakeContext {
    fn top_level_image_ids(&self) -> Result<Vec<ItemId>> {
        Ok(self.file.items.iter().map(|i| i.info.id).collect())
    }

    fn primary_image_id(&self) -> Result<ItemId> {
        Ok(self.file.primary)
    }

    fn handle_info(&self, item: ItemRef) -> Result<HandleInfo> {
        Ok(self.find(item)?.info.clone())
    }

    fn decode(&self, item: ItemRef, mode: Mode) -> Result<PlaneBuf> {
        let stored = self.find(item)?;
        if !self.shared.delay.is_zero() {
            std::thread::sleep(self.shared.delay);
        }
        self.shared.decodes.fetch_add(1, Ordering::SeqCst);

        if let Some((w, h)) = self.shared.decoded_size {
            return PlaneBuf::zeroed(w, h, mode.bytes_per_pixel(), None);
        }

        let (plane, from) = if stored.mode.channels() == 1 && mode.channels() != 1 {
            gray_to_rgb(&stored.plane, stored.mode)?
        } else {
            (stored.plane.clone(), stored.mode)
        };
        let converted = convert_plane(&plane, from, mode)?;
        // Codecs hand back rows aligned to 16 bytes
        let stride = converted.row_bytes().div_ceil(16) * 16;
        let mut padded = PlaneBuf::zeroed(
            converted.width(),
            converted.height(),
            mode.bytes_per_pixel(),
            Some(stride),
        )?;
        converted.write_to(padded.data_mut(), stride)?;
        Ok(padded)
    }
}

struct FakeWriter {
    backend: FakeBackend,
    file: FakeFile,
    next_id: ItemId,
}

impl FakeWriter {
    fn take_id(&mut self) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut FakeItem> {
        self.file
            .items
            .iter_mut()
            .find(|i| i.info.id == id)
            .ok_or_else(|| {
                at(Error::from(HeifError::usage(
                    subcode::UNSPECIFIED,
                    format!("No item {id}"),
                )))
            })
    }
}

impl NativeWriter for FakeWriter {
    fn encode_image(&mut self, image: &EncodableImage<'_>) -> Result<ItemId> {
        let id = self.take_id();
        let mut item = FakeItem::new(id, image.mode, image.plane.clone());
        item.info.color_profile = image.color_profile.clone();
        self.file.items.push(item);
        Ok(id)
    }

    fn encode_thumbnail(
        &mut self,
        image: &EncodableImage<'_>,
        master: ItemId,
        bbox: u32,
    ) -> Result<Option<ItemId>> {
        let (w, h) = image.plane.size();
        if w.max(h) <= bbox {
            return Ok(None);
        }
        let (tw, th) = if w >= h {
            (bbox, (h as u64 * bbox as u64 / w as u64).max(1) as u32)
        } else {
            ((w as u64 * bbox as u64 / h as u64).max(1) as u32, bbox)
        };
        let plane = scale_plane(image.plane, tw, th)?;
        let id = self.take_id();
        let thumb = FakeItem::new(id, image.mode, plane);
        let master = self.item_mut(master)?;
        master.info.thumbnail_ids.push(id);
        master.thumbnails.push(thumb);
        Ok(Some(id))
    }

    fn set_primary(&mut self, id: ItemId) -> Result<()> {
        self.item_mut(id)?;
        self.file.primary = id;
        Ok(())
    }

    fn add_metadata(&mut self, id: ItemId, block: &MetadataBlock) -> Result<()> {
        block.four_cc()?;
        // Stored the way a container carries it: Exif gains its 4-byte offset
        let raw = match block {
            MetadataBlock::Exif(data) => {
                let mut raw = vec![0, 0, 0, 0];
                raw.extend_from_slice(data);
                raw
            }
            other => other.data().to_vec(),
        };
        let stored = MetadataBlock::from_native(block.item_type(), block.content_type(), raw);
        self.item_mut(id)?.info.metadata.push(stored);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        let FakeWriter { backend, file, .. } = *self;
        Ok(backend.store(file))
    }
}
