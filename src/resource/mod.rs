//! Owning wrappers for GPU resources and the copyable identity values
//! ([`ImageHandle`], [`BufferHandle`], [`ImageView`], [`BufferView`]) the rest
//! of the library works with.

pub mod buffer;
pub mod image;

pub use buffer::{Buffer, BufferHandle, BufferView};
pub use image::{aspect_from_format, Image, ImageCreateInfo, ImageHandle, ImageView, ImgView};
