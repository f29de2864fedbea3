// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Provider-specific lookups and their fallback chains. Every function
//! returns a price in the reporting currency or an error; caching lives one
//! level up.

use anyhow::{Context, Result, anyhow};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::QuoteSource;
use crate::config::{Endpoints, Policy};

pub const GRAMS_PER_TROY_OUNCE: Decimal = Decimal::from_parts(311034768, 0, 0, false, 7);

/// CoinGecko id for a ticker; unknown tickers are tried as their lowercase
/// form.
pub fn crypto_id(symbol: &str) -> String {
    let id = match symbol.trim().to_ascii_uppercase().as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        "BNB" => "binancecoin",
        "SOL" => "solana",
        "XRP" => "ripple",
        "ADA" => "cardano",
        "DOGE" => "dogecoin",
        "AVAX" => "avalanche-2",
        "DOT" => "polkadot",
        "MATIC" => "matic-network",
        "TRX" => "tron",
        "LTC" => "litecoin",
        "LINK" => "chainlink",
        "XAUT" => "tether-gold",
        "PAXG" => "pax-gold",
        _ => return symbol.trim().to_ascii_lowercase(),
    };
    id.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metal {
    Gold,
    Silver,
}

impl Metal {
    fn code(&self) -> &'static str {
        match self {
            Metal::Gold => "XAU",
            Metal::Silver => "XAG",
        }
    }

    /// Token backed one-to-one by a troy ounce, quoted on the crypto endpoint.
    fn backing_token(&self) -> &'static str {
        match self {
            Metal::Gold => "tether-gold",
            Metal::Silver => "kinesis-silver",
        }
    }
}

/// A priced metal product: an ounce, a gram, or a 22k coin of fixed weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetalProduct {
    pub metal: Metal,
    /// `None` prices a full troy ounce.
    pub grams: Option<Decimal>,
    pub coin: bool,
}

pub fn metal_product(symbol: &str) -> Option<MetalProduct> {
    let (metal, grams, coin) = match symbol.trim().to_ascii_lowercase().as_str() {
        "ons" | "ons_altin" | "xau" | "gold" => (Metal::Gold, None, false),
        "gram_altin" | "gram" | "gold_gram" => (Metal::Gold, Some(Decimal::ONE), false),
        "ceyrek_altin" | "ceyrek" | "quarter" => (Metal::Gold, Some(Decimal::new(175, 2)), true),
        "yarim_altin" | "yarim" | "half" => (Metal::Gold, Some(Decimal::new(35, 1)), true),
        "tam_altin" | "tam" | "full" => (Metal::Gold, Some(Decimal::new(7, 0)), true),
        "ons_gumus" | "xag" | "silver" => (Metal::Silver, None, false),
        "gram_gumus" | "silver_gram" => (Metal::Silver, Some(Decimal::ONE), false),
        _ => return None,
    };
    Some(MetalProduct { metal, grams, coin })
}

/// Prices `product` from the reporting-currency price of one troy ounce.
pub fn price_metal_product(ounce: Decimal, product: &MetalProduct, policy: &Policy) -> Decimal {
    let Some(grams) = product.grams else {
        return ounce;
    };
    let mut price = ounce / GRAMS_PER_TROY_OUNCE * grams;
    if product.coin {
        price = price * policy.gold_coin_purity * policy.gold_coin_premium;
    }
    price.round_dp(6)
}

/// Reads a positive number at `path`, accepting JSON numbers and numeric
/// strings.
pub fn number_at(v: &Value, path: &[&str]) -> Option<Decimal> {
    let mut cur = v;
    for key in path {
        cur = cur.get(*key)?;
    }
    let d = match cur {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Decimal::from(i)
            } else {
                Decimal::try_from(n.as_f64()?).ok()?
            }
        }
        Value::String(s) => s.trim().parse::<Decimal>().ok()?,
        _ => return None,
    };
    (d > Decimal::ZERO).then_some(d)
}

fn trimmed(base: &str) -> &str {
    base.trim_end_matches('/')
}

pub(crate) struct Fetcher<'a> {
    pub source: &'a dyn QuoteSource,
    pub endpoints: &'a Endpoints,
    pub policy: &'a Policy,
    pub reporting: &'a str,
}

impl Fetcher<'_> {
    pub fn crypto(&self, symbol: &str) -> Result<Decimal> {
        let id = crypto_id(symbol);
        let vs = self.reporting.to_ascii_lowercase();
        let url = format!(
            "{}/simple/price?ids={id}&vs_currencies={vs}",
            trimmed(&self.endpoints.crypto)
        );
        let body = self.source.fetch_json(&url)?;
        number_at(&body, &[&id, &vs]).ok_or_else(|| anyhow!("no {vs} quote for {id}"))
    }

    /// One unit of `symbol` in the reporting currency.
    pub fn forex(&self, symbol: &str) -> Result<Decimal> {
        let base = symbol.trim().to_ascii_uppercase();
        let quote = self.reporting.to_ascii_uppercase();
        if base == quote {
            return Ok(Decimal::ONE);
        }
        let steps: [(&str, fn(&Self, &str, &str) -> Result<Decimal>); 3] = [
            ("convert", Self::forex_convert),
            ("latest", Self::forex_latest),
            ("inverse", Self::forex_inverse),
        ];
        let mut last = anyhow!("no forex step ran");
        for (step, run) in steps {
            match run(self, &base, &quote) {
                Ok(rate) => return Ok(rate),
                Err(e) => {
                    debug!(%base, %quote, step, error = %e, "forex step failed");
                    last = e;
                }
            }
        }
        Err(last)
    }

    fn forex_convert(&self, base: &str, quote: &str) -> Result<Decimal> {
        let url = format!(
            "{}/convert?from={base}&to={quote}&amount=1",
            trimmed(&self.endpoints.forex_convert)
        );
        let body = self.source.fetch_json(&url)?;
        number_at(&body, &["result"])
            .or_else(|| number_at(&body, &["info", "rate"]))
            .ok_or_else(|| anyhow!("convert returned no result"))
    }

    fn forex_latest(&self, base: &str, quote: &str) -> Result<Decimal> {
        let url = format!(
            "{}/latest?base={base}&symbols={quote}",
            trimmed(&self.endpoints.forex_latest)
        );
        let body = self.source.fetch_json(&url)?;
        number_at(&body, &["rates", quote]).ok_or_else(|| anyhow!("latest has no {quote} rate"))
    }

    fn forex_inverse(&self, base: &str, quote: &str) -> Result<Decimal> {
        let url = format!(
            "{}/latest?base={quote}&symbols={base}",
            trimmed(&self.endpoints.forex_latest)
        );
        let body = self.source.fetch_json(&url)?;
        let rate =
            number_at(&body, &["rates", base]).ok_or_else(|| anyhow!("latest has no {base} rate"))?;
        Ok(Decimal::ONE / rate)
    }

    /// USD price of one troy ounce: metals endpoint first, then the
    /// metal-backed token.
    fn usd_ounce(&self, metal: Metal) -> Result<Decimal> {
        let code = metal.code();
        let url = format!(
            "{}/latest?base=USD&currencies={code}",
            trimmed(&self.endpoints.metals)
        );
        let direct = self.source.fetch_json(&url).and_then(|body| {
            number_at(&body, &["rates", &format!("USD{code}")])
                .or_else(|| number_at(&body, &["rates", code]).map(|per_usd| Decimal::ONE / per_usd))
                .ok_or_else(|| anyhow!("metals endpoint has no {code} rate"))
        });
        match direct {
            Ok(p) => return Ok(p),
            Err(e) => debug!(metal = code, error = %e, "metals endpoint failed; trying token"),
        }
        let token = metal.backing_token();
        let url = format!(
            "{}/simple/price?ids={token}&vs_currencies=usd",
            trimmed(&self.endpoints.crypto)
        );
        let body = self.source.fetch_json(&url)?;
        number_at(&body, &[token, "usd"]).ok_or_else(|| anyhow!("no usd quote for {token}"))
    }

    pub fn metals(&self, symbol: &str) -> Result<Decimal> {
        let product = metal_product(symbol).with_context(|| format!("unknown metal product '{symbol}'"))?;
        let usd_ounce = self.usd_ounce(product.metal)?;
        let per_usd = self.forex("USD")?;
        Ok(price_metal_product(usd_ounce * per_usd, &product, self.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gram_price_from_ounce() {
        let gram = price_metal_product(
            Decimal::new(6220697, 2),
            &metal_product("gram_altin").unwrap(),
            &Policy::default(),
        );
        assert!((gram - Decimal::from(2000)).abs() < Decimal::new(1, 2));
    }

    #[test]
    fn quarter_coin_applies_purity_and_premium() {
        let ounce = GRAMS_PER_TROY_OUNCE * Decimal::from(2000);
        let quarter = price_metal_product(ounce, &metal_product("ceyrek").unwrap(), &Policy::default());
        // 2000 * 1.75 * 0.916 * 1.02
        assert_eq!(quarter, Decimal::new(32701200, 4));
    }

    #[test]
    fn number_at_reads_numbers_and_strings() {
        let v = json!({"rates": {"TRY": 32.5, "EUR": "0.92", "BAD": 0}});
        assert_eq!(number_at(&v, &["rates", "TRY"]), Some(Decimal::new(325, 1)));
        assert_eq!(number_at(&v, &["rates", "EUR"]), Some(Decimal::new(92, 2)));
        assert_eq!(number_at(&v, &["rates", "BAD"]), None);
        assert_eq!(number_at(&v, &["rates", "GBP"]), None);
    }

    #[test]
    fn ticker_mapping_falls_back_to_lowercase() {
        assert_eq!(crypto_id("btc"), "bitcoin");
        assert_eq!(crypto_id("PEPE"), "pepe");
    }
}
