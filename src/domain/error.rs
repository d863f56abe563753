//! Domain error types.

/// A parse error with position information for expression parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Failure while evaluating an expression against a context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("unsupported construct: {construct}")]
    UnsupportedConstruct { construct: String },

    #[error("function '{name}' unavailable: {reason}")]
    FunctionLookup { name: String, reason: String },

    #[error("{function}() failed in '{expression}': {message}")]
    Runtime {
        function: String,
        expression: String,
        message: String,
    },

    #[error("{target} has no attribute '{attribute}'")]
    UnknownAttribute { target: String, attribute: String },

    #[error("type error: {message}")]
    Type { message: String },
}

impl ExprError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ExprError::Type {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>) -> Self {
        ExprError::UnsupportedConstruct {
            construct: construct.into(),
        }
    }
}

/// A stock record that violates the OHLCV invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StockError {
    #[error("{ticker} {date}: {field} must be positive, got {value}")]
    NonPositivePrice {
        ticker: String,
        date: chrono::NaiveDate,
        field: &'static str,
        value: f64,
    },

    #[error("{ticker} {date}: volume must be non-negative, got {volume}")]
    NegativeVolume {
        ticker: String,
        date: chrono::NaiveDate,
        volume: i64,
    },

    #[error("{ticker} {date}: high {high} below low {low}")]
    HighBelowLow {
        ticker: String,
        date: chrono::NaiveDate,
        high: f64,
        low: f64,
    },

    #[error("{ticker} {date}: close {close} outside [{low}, {high}]")]
    CloseOutOfRange {
        ticker: String,
        date: chrono::NaiveDate,
        close: f64,
        low: f64,
        high: f64,
    },
}

/// Function registration and toggling failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("function '{0}' is already registered")]
    Duplicate(String),

    #[error("function '{0}' is not registered")]
    Unknown(String),
}

/// Structural problems in a block graph, detected at load time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("root node '{0}' is not defined")]
    MissingRoot(String),

    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    #[error("edge {from} -> {to} references undefined node '{missing}'")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    #[error("node '{node}' spot condition references undefined block '{predecessor}'")]
    UnknownSpotPredecessor { node: String, predecessor: String },

    #[error("node '{0}' uses a reserved context name as its id")]
    ReservedBlockId(String),

    #[error("node '{node}' condition '{condition}': {source}")]
    InvalidCondition {
        node: String,
        condition: String,
        #[source]
        source: ParseError,
    },
}

/// Illegal lifecycle transition on a block instance.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlockStateError {
    #[error("block '{0}' is already completed")]
    AlreadyCompleted(String),

    #[error("block '{0}' already holds the maximum number of spots")]
    SpotsFull(String),
}

/// Top-level error type for blockscan.
#[derive(Debug, thiserror::Error)]
pub enum BlockscanError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error("stock data error: {reason}")]
    Data { reason: String },

    #[error("no data for {ticker}")]
    NoData { ticker: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&BlockscanError> for std::process::ExitCode {
    fn from(err: &BlockscanError) -> Self {
        let code: u8 = match err {
            BlockscanError::Io(_) => 1,
            BlockscanError::ConfigParse { .. }
            | BlockscanError::ConfigMissing { .. }
            | BlockscanError::ConfigInvalid { .. } => 2,
            BlockscanError::Data { .. } | BlockscanError::Stock(_) => 3,
            BlockscanError::Graph(_) => 4,
            BlockscanError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
