pub mod container;
pub mod image;
pub mod presenter;
pub(crate) mod worker;

pub use container::{open_stream, Chunk, ContainerReader, ContainerWriter, DecodeError, StreamHeader};
pub use image::{FrameBuffer, Palette};
pub use presenter::{format_position, ChannelPresenter, Frame, Presenter};
pub use worker::VideoOutcome;
