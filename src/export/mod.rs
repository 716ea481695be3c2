mod coordinator;
mod encoder;
mod gif_encoder;
#[cfg(test)]
pub(crate) mod mock;
mod progress;
mod session;

pub use coordinator::EncodeCoordinator;
pub use encoder::{
    Artifact, EncodeError, Encoder, EncoderEvent, EncoderFactory, EncoderOptions, RenderHandle,
};
pub use gif_encoder::{GifEncoder, GifEncoderFactory};
pub use progress::{percentages, Percentages, ProgressReporter};
pub use session::{
    CaptureJob, ExportObserver, ExportOptions, ExportSession, FailureKind, FailureReason,
    JobOutcome, JobState, NoopObserver, SessionEvent, StartError,
};
