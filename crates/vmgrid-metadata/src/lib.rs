//! VmGrid metadata: the boot document handed to a new guest.
//!
//! [`build_metadata`] allocates an instance's interfaces through the network
//! crate and feeds each one into a [`MetadataBuilder`], which emits the
//! finished [`InstanceDocument`] in one piece.

pub mod builder;
pub mod document;
pub mod error;
pub mod synthesizer;

pub use builder::MetadataBuilder;
pub use document::{
    InstanceDocument, LinkRecord, NetworkRecord, OcpRecord, RouteRecord, VlanRecord, ZvmRecord,
};
pub use error::{MetadataError, MetadataResult};
pub use synthesizer::{Metadata, MetadataRequest, ZVM_VIRT_TYPE, build_metadata};
