//! Craft Element Model
//!
//! The data every other crafting crate speaks in.
//!
//! # Core Concepts
//!
//! - [`Element`]: a discovered artifact with title, description, image and
//!   optional parent pair
//! - [`ElementId`] / [`InstanceId`]: element identity vs. placement identity
//! - [`PairKey`]: commutative key for an unordered pair of elements, used to
//!   index the combination cache
//! - [`ImagePayload`]: image bytes plus media type
//! - [`ContentHash`]: Blake3 digest of image bytes
//!
//! # Example
//!
//! ```rust,ignore
//! use craft_element::{Element, ImagePayload, MediaType, PairKey};
//!
//! let fire = Element::seed("Fire", "Flames.", ImagePayload::new(png, MediaType::png()));
//! let water = Element::seed("Water", "A wave.", ImagePayload::new(png, MediaType::png()));
//!
//! // Same key regardless of order
//! assert_eq!(PairKey::new(fire.id(), water.id()), PairKey::new(water.id(), fire.id()));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod element;
mod hash;
mod id;
mod image;
mod pair;

pub use element::Element;
pub use hash::{ContentHash, HashError};
pub use id::{ElementId, IdError, InstanceId};
pub use image::{ImageFormat, ImagePayload, MediaType};
pub use pair::{PairKey, PairKeyError, ParentPair};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
