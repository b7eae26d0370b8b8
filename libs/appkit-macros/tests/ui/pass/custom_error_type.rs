use std::fmt;

use appkit::App;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct Ratio {
    num: f64,
    den: f64,
}

#[derive(Serialize, ToSchema)]
pub struct Quotient {
    value: f64,
}

#[derive(Debug)]
pub struct DivisionByZero;

impl fmt::Display for DivisionByZero {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("division by zero")
    }
}

impl std::error::Error for DivisionByZero {}

#[derive(Default)]
pub struct Divider;

#[appkit::app]
impl Divider {
    #[endpoint]
    fn divide(&self, input: Ratio) -> Result<Quotient, DivisionByZero> {
        if input.den == 0.0 {
            return Err(DivisionByZero);
        }
        Ok(Quotient {
            value: input.num / input.den,
        })
    }
}

fn main() {
    let registry = appkit::Registry::new();
    Divider::register(&registry).unwrap();
}
