//! Currency conversion contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CurrencyCode, Money};

use super::CallRecorder;
use crate::transport::{RpcRequest, TransportError};

pub const SERVICE: &str = "CurrencyService";

/// Reference currency of the built-in rate table.
pub const REFERENCE_CURRENCY: &str = "EUR";

const DEFAULT_RATES: &[(&str, f64)] = &[
    ("EUR", 1.0),
    ("USD", 1.1305),
    ("JPY", 126.40),
    ("GBP", 0.85970),
    ("CAD", 1.5128),
    ("CHF", 1.1360),
    ("TRY", 6.1247),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRequest {
    pub from: Money,
    pub to_code: CurrencyCode,
}

/// Pricing collaborator.
#[async_trait]
pub trait CurrencyService: Send + Sync {
    async fn convert(&self, request: RpcRequest<ConvertRequest>) -> Result<Money, TransportError>;
}

#[derive(Debug)]
struct InMemoryCurrencyState {
    /// Units of each currency per one unit of the reference currency.
    rates: HashMap<CurrencyCode, f64>,
    fail_on_convert: bool,
}

/// Converts through a fixed rate table relative to [`REFERENCE_CURRENCY`].
#[derive(Debug, Clone)]
pub struct InMemoryCurrencyService {
    state: Arc<RwLock<InMemoryCurrencyState>>,
    recorder: CallRecorder,
}

impl Default for InMemoryCurrencyService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCurrencyService {
    /// A service seeded with the default rate table.
    pub fn new() -> Self {
        let rates = DEFAULT_RATES
            .iter()
            .filter_map(|(code, rate)| Some((CurrencyCode::parse(code).ok()?, *rate)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(InMemoryCurrencyState {
                rates,
                fail_on_convert: false,
            })),
            recorder: CallRecorder::new(),
        }
    }

    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &CallRecorder {
        &self.recorder
    }

    /// Sets the rate of `code` relative to the reference currency.
    pub fn set_rate(&self, code: CurrencyCode, rate: f64) {
        self.state.write().unwrap().rates.insert(code, rate);
    }

    pub fn supported_currencies(&self) -> Vec<CurrencyCode> {
        let mut codes: Vec<_> = self.state.read().unwrap().rates.keys().copied().collect();
        codes.sort();
        codes
    }

    pub fn set_fail_on_convert(&self, fail: bool) {
        self.state.write().unwrap().fail_on_convert = fail;
    }
}

#[async_trait]
impl CurrencyService for InMemoryCurrencyService {
    async fn convert(&self, request: RpcRequest<ConvertRequest>) -> Result<Money, TransportError> {
        self.recorder.record(SERVICE, "Convert", &request.metadata);

        let state = self.state.read().unwrap();
        if state.fail_on_convert {
            return Err(TransportError::Unavailable(
                "currency backend unreachable".to_string(),
            ));
        }

        let ConvertRequest { from, to_code } = request.body;
        let rate = |code: CurrencyCode| {
            state
                .rates
                .get(&code)
                .copied()
                .filter(|rate| *rate > 0.0)
                .ok_or_else(|| TransportError::status(400, format!("unsupported currency {code}")))
        };
        let from_rate = rate(from.currency())?;
        let to_rate = rate(to_code)?;

        // Float only at the boundary; the result is re-quantized to nanos.
        let in_reference = from.to_f64() / from_rate;
        Money::from_f64(in_reference * to_rate, to_code)
            .map_err(|err| TransportError::status(400, err.to_string()))
    }
}
