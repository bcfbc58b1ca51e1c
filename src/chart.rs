//! Chart kinds, kind dispatch and the renderer seam

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::axis::TickLayout;
use crate::error::RenderError;
use crate::frequency::Frequency;
use crate::types::{PriceField, Ticker, WindowSlice};

/// Chart style of a rendered image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Candlestick,
    Line,
    Barline,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Candlestick, ChartKind::Line, ChartKind::Barline];

    /// Divisor turning a nominal threshold into window rows
    pub fn multiplier(&self) -> usize {
        match self {
            ChartKind::Candlestick => 4,
            ChartKind::Line => 1,
            ChartKind::Barline => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Candlestick => "candlestick",
            ChartKind::Line => "line",
            ChartKind::Barline => "barline",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown chart kind '{}'", s))
    }
}

/// How the chart kind of a request is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindSelection {
    /// OS entropy: varies run-to-run even under a fixed seed
    #[default]
    Entropy,
    /// Drawn from the request's seeded source: reproducible
    Seeded,
    Fixed(ChartKind),
}

impl FromStr for KindSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "entropy" => Ok(KindSelection::Entropy),
            "seeded" => Ok(KindSelection::Seeded),
            other => other
                .parse::<ChartKind>()
                .map(KindSelection::Fixed)
                .map_err(|_| {
                    format!(
                        "unknown kind selection '{}', expected entropy, seeded, candlestick, line or barline",
                        s
                    )
                }),
        }
    }
}

/// Pick a chart kind and its row multiplier
pub fn dispatch<R: Rng + ?Sized>(selection: KindSelection, rng: &mut R) -> (ChartKind, usize) {
    let kind = match selection {
        KindSelection::Entropy => choose_kind(&mut OsRng),
        KindSelection::Seeded => choose_kind(rng),
        KindSelection::Fixed(kind) => kind,
    };
    (kind, kind.multiplier())
}

fn choose_kind<R: Rng + ?Sized>(rng: &mut R) -> ChartKind {
    *ChartKind::ALL.choose(rng).unwrap_or(&ChartKind::Line)
}

/// Everything a renderer needs to draw and persist one image
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub kind: ChartKind,
    pub window: &'a WindowSlice,
    pub ticker: &'a Ticker,
    pub frequency: Frequency,
    pub output_path: &'a Path,
    pub ticks: &'a TickLayout,
    pub y_axis_title: String,
    /// Plotted field for line charts
    pub price_field: Option<PriceField>,
}

impl RenderRequest<'_> {
    /// Chart caption: line charts name their field, others carry none
    pub fn title(&self) -> Option<String> {
        self.price_field
            .filter(|_| self.kind == ChartKind::Line)
            .map(|field| format!("{} {}", self.ticker, field))
    }
}

/// Draws a window and writes the image to `request.output_path`
pub trait ChartRenderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_multipliers() {
        assert_eq!(ChartKind::Candlestick.multiplier(), 4);
        assert_eq!(ChartKind::Line.multiplier(), 1);
        assert_eq!(ChartKind::Barline.multiplier(), 2);
    }

    #[test]
    fn test_fixed_dispatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(
            dispatch(KindSelection::Fixed(ChartKind::Barline), &mut rng),
            (ChartKind::Barline, 2)
        );
    }

    #[test]
    fn test_seeded_dispatch_reproducible() {
        for seed in 0..10 {
            let a = dispatch(KindSelection::Seeded, &mut ChaCha8Rng::seed_from_u64(seed));
            let b = dispatch(KindSelection::Seeded, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_entropy_dispatch_leaves_request_rng_untouched() {
        let mut used = ChaCha8Rng::seed_from_u64(9);
        let mut fresh = ChaCha8Rng::seed_from_u64(9);
        let (kind, multiplier) = dispatch(KindSelection::Entropy, &mut used);

        assert_eq!(kind.multiplier(), multiplier);
        assert_eq!(used.gen::<u64>(), fresh.gen::<u64>());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!("entropy".parse::<KindSelection>().unwrap(), KindSelection::Entropy);
        assert_eq!("Seeded".parse::<KindSelection>().unwrap(), KindSelection::Seeded);
        assert_eq!(
            "line".parse::<KindSelection>().unwrap(),
            KindSelection::Fixed(ChartKind::Line)
        );
        assert!("pie".parse::<KindSelection>().is_err());
    }

    #[test]
    fn test_selection_serde() {
        let fixed: KindSelection = serde_json::from_str(r#"{"fixed":"candlestick"}"#).unwrap();
        assert_eq!(fixed, KindSelection::Fixed(ChartKind::Candlestick));
        let seeded: KindSelection = serde_json::from_str(r#""seeded""#).unwrap();
        assert_eq!(seeded, KindSelection::Seeded);
    }
}
