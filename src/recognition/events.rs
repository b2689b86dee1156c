/// Why a recognition stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The stream was stopped on request
    Stopped,
    /// The audio source was exhausted and all results delivered
    EndOfInput,
    /// Capture device or STT failure
    Error(String),
}

/// A unit of output from the recognition engine, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Final recognized utterance
    Recognized { speaker_id: String, text: String },
    /// Speech was detected but could not be transcribed
    NoMatch { details: String },
    /// No further events follow
    Ended(EndReason),
}
