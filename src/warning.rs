use crate::model::CellPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    BlankTable,
    StageOneExhausted,
    StageTwoExhausted,
    NoFieldsFound,
    UnknownLabel,
    TableNotFound,
    PositionOutOfBounds,
    ValueMismatch,
    AlreadyTemplated,
    EmptyKey,
    UnreadableBatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub ordinal: Option<usize>,
    pub position: Option<CellPosition>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ordinal: None,
            position: None,
        }
    }

    #[must_use]
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: CellPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Emits the diagnostic as a `tracing` warning and returns it for collection.
    #[must_use]
    pub fn logged(self) -> Self {
        tracing::warn!(
            code = ?self.code,
            ordinal = ?self.ordinal,
            position = ?self.position,
            "{}",
            self.message
        );
        self
    }
}
