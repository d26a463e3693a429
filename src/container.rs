//! The `HeifFile` container: an ordered list of top-level images

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use whereat::at;

use crate::brand::Brand;
use crate::error::{Error, ErrorCode, HeifError, Result, subcode};
use crate::image::{HeifImage, HeifThumbnail};
use crate::mode::Mode;
use crate::native::{DecodeSettings, ItemId, NativeContext};
use crate::options::Options;
use crate::pixels::PixelData;

/// A HEIF or AVIF file: top-level images in file order
///
/// Images opened from a file decode lazily through a native context owned
/// here; dropping the file makes their pending loads fail with
/// [`Error::Closed`].
#[derive(Default)]
pub struct HeifFile {
    images: Vec<HeifImage>,
    brand: Brand,
    context: Option<Arc<dyn NativeContext>>,
}

impl core::fmt::Debug for HeifFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeifFile")
            .field("brand", &self.brand)
            .field("images", &self.images)
            .field("open", &self.context.is_some())
            .finish()
    }
}

impl HeifFile {
    /// An empty container, for building files from pixels
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file held in memory
    ///
    /// The primary image comes first, the others follow in file order. No
    /// pixels are decoded.
    pub fn open(data: impl Into<Vec<u8>>, options: &Options) -> Result<Self> {
        let data = data.into();
        let backend = options
            .backend
            .as_ref()
            .ok_or_else(|| at(Error::from(HeifError::no_decoder())))?;
        let brand = Brand::detect(&data);
        if brand == Brand::Unknown {
            warn!("opening file with unknown brand via {}", backend.name());
        }

        let settings = DecodeSettings {
            threads: options.decode_threads,
            convert_hdr_to_8bit: options.convert_hdr_to_8bit,
        };
        let context = backend.open(data, &settings)?;
        let mut ids = context.top_level_image_ids()?;
        if ids.is_empty() {
            return Err(at(Error::from(HeifError::invalid_input(
                subcode::NO_IMAGES,
                "No images found",
            ))));
        }
        let primary = context.primary_image_id()?;
        ids.sort_by_key(|&id| id != primary);

        let images = ids
            .iter()
            .map(|&id| HeifImage::from_context(&context, id, id == primary, brand, options))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "opened {:?} file with {} image(s), primary {primary}",
            brand,
            images.len()
        );
        Ok(Self {
            images,
            brand,
            context: Some(context),
        })
    }

    /// Open a file from disk
    pub fn open_path(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => at(Error::from(HeifError::new(
                ErrorCode::InputDoesNotExist,
                subcode::UNSPECIFIED,
                format!("No such file: {}", path.display()),
            ))),
            _ => at(Error::Io(e)),
        })?;
        Self::open(data, options)
    }

    /// Open a file from a stream, reading it to the end
    pub fn open_reader<R: Read>(mut reader: R, options: &Options) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|e| at(Error::Io(e)))?;
        Self::open(data, options)
    }

    /// A container holding one image built from caller pixels
    ///
    /// `stride` of `None` means packed rows.
    pub fn from_bytes(mode: Mode, size: (u32, u32), data: &[u8], stride: Option<usize>) -> Result<Self> {
        let mut file = Self::new();
        file.add_frombytes(mode, size, data, stride)?;
        Ok(file)
    }

    /// A container holding one image built from typed pixels
    pub fn from_pixel_data(pixels: &PixelData) -> Result<Self> {
        let mut file = Self::new();
        file.add_pixel_data(pixels)?;
        Ok(file)
    }

    /// Number of top-level images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether there are no images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image at `index`
    pub fn get(&self, index: usize) -> Result<&HeifImage> {
        let len = self.images.len();
        self.images
            .get(index)
            .ok_or_else(|| at(Error::IndexOutOfRange { index, len }))
    }

    /// Mutable image at `index`
    pub fn get_mut(&mut self, index: usize) -> Result<&mut HeifImage> {
        let len = self.images.len();
        self.images
            .get_mut(index)
            .ok_or_else(|| at(Error::IndexOutOfRange { index, len }))
    }

    /// All images, in order
    pub fn images(&self) -> &[HeifImage] {
        &self.images
    }

    /// Iterate over the images
    pub fn iter(&self) -> core::slice::Iter<'_, HeifImage> {
        self.images.iter()
    }

    /// Iterate mutably over the images
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, HeifImage> {
        self.images.iter_mut()
    }

    /// Major brand of the source file; [`Brand::Unknown`] for built files
    pub fn brand(&self) -> Brand {
        self.brand
    }

    /// MIME type for the source brand
    pub fn mimetype(&self) -> &'static str {
        self.brand.mimetype()
    }

    /// Index of the primary image: the last image flagged primary, or `0`
    pub fn primary_index(&self) -> usize {
        self.images.iter().rposition(HeifImage::is_primary).unwrap_or(0)
    }

    /// The primary image
    pub fn primary(&self) -> Result<&HeifImage> {
        self.get(self.primary_index())
    }

    /// Mutable primary image
    pub fn primary_mut(&mut self) -> Result<&mut HeifImage> {
        let index = self.primary_index();
        self.get_mut(index)
    }

    /// Thumbnails of the primary image
    pub fn thumbnails(&self) -> Result<&[HeifThumbnail]> {
        Ok(self.primary()?.thumbnails())
    }

    /// Make the image at `index` the only primary image
    pub fn set_primary(&mut self, index: usize) -> Result<()> {
        self.get(index)?;
        for (i, image) in self.images.iter_mut().enumerate() {
            image.set_primary(i == index);
        }
        Ok(())
    }

    /// Thumbnails of every image, in order; with `one_for_image` only the
    /// first thumbnail of each image
    pub fn thumbnails_all(&self, one_for_image: bool) -> impl Iterator<Item = &HeifThumbnail> + '_ {
        let take = if one_for_image { 1 } else { usize::MAX };
        self.images
            .iter()
            .flat_map(move |image| image.thumbnails().iter().take(take))
    }

    /// Decode the primary image, or every image with `everything`
    pub fn load(&self, everything: bool) -> Result<&Self> {
        if everything {
            for image in &self.images {
                image.load()?;
            }
        } else {
            self.primary()?.load()?;
        }
        Ok(self)
    }

    /// Plan thumbnails of each box size for every image
    pub fn add_thumbnails(&mut self, boxes: &[u32]) {
        for image in &mut self.images {
            image.add_thumbnails(boxes);
        }
    }

    /// Id the next added image gets: two past the largest id in use
    fn next_id(&self) -> ItemId {
        let max = self
            .images
            .iter()
            .flat_map(|image| {
                core::iter::once(image.id()).chain(image.thumbnails().iter().map(HeifThumbnail::thumb_id))
            })
            .max()
            .unwrap_or(0);
        max + 2
    }

    fn push_copy(&mut self, image: &HeifImage) -> Result<&mut HeifImage> {
        let mut next = self.next_id();
        let copy = image.copied(|| {
            let id = next;
            next += 2;
            id
        })?;
        let index = self.images.len();
        self.images.push(copy);
        if !self.images.iter().any(HeifImage::is_primary) {
            self.images[0].set_primary(true);
        }
        debug!("added image {} at index {index}", self.images[index].id());
        Ok(&mut self.images[index])
    }

    /// Append an image
    ///
    /// The image gets fresh ids and is not primary unless the container had
    /// no primary image. Images from another file are decoded and detached
    /// from it.
    pub fn add_image(&mut self, image: HeifImage) -> Result<&mut HeifImage> {
        self.push_copy(&image)
    }

    /// Append an image built from caller pixels
    pub fn add_frombytes(
        &mut self,
        mode: Mode,
        size: (u32, u32),
        data: &[u8],
        stride: Option<usize>,
    ) -> Result<&mut HeifImage> {
        let image = HeifImage::from_bytes(mode, size, data, stride)?;
        self.push_copy(&image)
    }

    /// Append an image built from typed pixels
    pub fn add_pixel_data(&mut self, pixels: &PixelData) -> Result<&mut HeifImage> {
        let image = HeifImage::from_pixel_data(pixels)?;
        self.push_copy(&image)
    }

    /// Append a copy of `image` with its info and thumbnails
    pub fn add_from_heif(&mut self, image: &HeifImage) -> Result<&mut HeifImage> {
        self.push_copy(image)
    }

    /// Append copies of every image of `file`
    pub fn add_all_from_heif(&mut self, file: &HeifFile) -> Result<()> {
        for image in file {
            self.push_copy(image)?;
        }
        Ok(())
    }

    /// Remove and return the image at `index`
    ///
    /// Removing the primary image makes the first remaining image primary.
    pub fn remove(&mut self, index: usize) -> Result<HeifImage> {
        self.get(index)?;
        let removed = self.images.remove(index);
        if removed.is_primary() {
            if let Some(first) = self.images.first_mut() {
                first.set_primary(true);
            }
        }
        Ok(removed)
    }

    /// Close every image and release the native context
    pub fn close(&mut self) {
        for image in &mut self.images {
            image.close();
        }
        self.context = None;
    }
}

impl<'a> IntoIterator for &'a HeifFile {
    type Item = &'a HeifImage;
    type IntoIter = core::slice::Iter<'a, HeifImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

impl<'a> IntoIterator for &'a mut HeifFile {
    type Item = &'a mut HeifImage;
    type IntoIter = core::slice::IterMut<'a, HeifImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter_mut()
    }
}
