//! The demo app served by this binary.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TwoNumbers {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CalcResult {
    pub result: f64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Amount {
    pub amount: i64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Total {
    pub total: i64,
}

/// Arithmetic endpoints plus a running counter shared by every request.
#[derive(Default)]
pub struct Calculator {
    ready: AtomicBool,
    counter: AtomicI64,
}

#[appkit::app(name = "calculator")]
impl Calculator {
    fn setup(&mut self) {
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!("calculator ready");
    }

    fn download_weights(&self) {
        tracing::info!("calculator has no weights to download");
    }

    #[endpoint]
    fn add(&self, input: TwoNumbers) -> CalcResult {
        CalcResult {
            result: input.a + input.b,
        }
    }

    #[endpoint]
    fn subtract(&self, input: TwoNumbers) -> CalcResult {
        CalcResult {
            result: input.a - input.b,
        }
    }

    #[endpoint]
    fn divide(&self, input: TwoNumbers) -> anyhow::Result<CalcResult> {
        anyhow::ensure!(input.b != 0.0, "division by zero");
        Ok(CalcResult {
            result: input.a / input.b,
        })
    }

    #[endpoint(path = "/counter/increment")]
    fn increment(&self, input: Amount) -> anyhow::Result<Total> {
        anyhow::ensure!(self.ready.load(Ordering::SeqCst), "setup() has not run");
        let total = self.counter.fetch_add(input.amount, Ordering::SeqCst) + input.amount;
        Ok(Total { total })
    }
}
