//! Holliday-Segar maintenance fluid calculator and its query handler.

use serde::Serialize;

use crate::text::lazy_pattern;

lazy_pattern!(WEIGHT_KG, r"(?i)(\d+(?:\.\d+)?)\s*kg");

/// Daily and hourly maintenance fluid for one body weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FluidRequirement {
    pub weight_kg: f64,
    pub daily_ml: f64,
    pub hourly_ml: f64,
    pub daily_liters: f64,
}

/// Tiered piecewise formula: 100 / 50 / 20 mL/kg/day and 4 / 2 / 1 mL/kg/hr
/// over the first 10 kg, the next 10 kg and every kg above 20.
pub fn calculate(weight_kg: f64) -> FluidRequirement {
    let w = weight_kg.max(0.0);
    let (daily_ml, hourly_ml) = if w <= 10.0 {
        (w * 100.0, w * 4.0)
    } else if w <= 20.0 {
        (1000.0 + (w - 10.0) * 50.0, 40.0 + (w - 10.0) * 2.0)
    } else {
        (1500.0 + (w - 20.0) * 20.0, 60.0 + (w - 20.0))
    };
    FluidRequirement {
        weight_kg: w,
        daily_ml,
        hourly_ml,
        daily_liters: daily_ml / 1000.0,
    }
}

/// First `<n> kg` figure in the text.
pub fn parse_weight(text: &str) -> Option<f64> {
    let re = WEIGHT_KG.as_ref()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Answer to a fluid calculation query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationAnswer {
    /// `None` when the query carried no weight.
    pub result: Option<FluidRequirement>,
    pub bullets: Vec<String>,
}

/// Build the calculator answer for a fluid query.
pub fn handle_fluid_query(query: &str) -> CalculationAnswer {
    match parse_weight(query) {
        Some(w) => {
            let r = calculate(w);
            CalculationAnswer {
                result: Some(r),
                bullets: format_requirement(&r),
            }
        }
        None => CalculationAnswer {
            result: None,
            bullets: vec![
                "• Patient weight in kg is needed, e.g. \"Calculate fluid requirements for 25 kg patient\"".to_string(),
                "• First 10 kg: 100 mL/kg/day (4 mL/kg/hr)".to_string(),
                "• Next 10 kg: 50 mL/kg/day (2 mL/kg/hr)".to_string(),
                "• Each kg above 20 kg: 20 mL/kg/day (1 mL/kg/hr)".to_string(),
            ],
        },
    }
}

pub fn format_requirement(r: &FluidRequirement) -> Vec<String> {
    vec![
        format!(
            "• Daily requirement for {} kg: {:.0} mL ({:.1} L)",
            trim_float(r.weight_kg),
            r.daily_ml,
            r.daily_liters
        ),
        format!("• Hourly rate: {:.1} mL/hr", r.hourly_ml),
        "• Method: Holliday-Segar maintenance formula".to_string(),
        "• Adjust for fever, ongoing losses and renal function; confirm against the prescription"
            .to_string(),
    ]
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        let r = calculate(5.0);
        assert_eq!((r.daily_ml, r.hourly_ml), (500.0, 20.0));
        let r = calculate(15.0);
        assert_eq!((r.daily_ml, r.hourly_ml), (1250.0, 50.0));
        let r = calculate(25.0);
        assert_eq!((r.daily_ml, r.hourly_ml), (1600.0, 65.0));
        assert!((r.daily_liters - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_continuous_at_tier_boundaries() {
        assert_eq!(calculate(10.0).daily_ml, 1000.0);
        assert_eq!(calculate(20.0).daily_ml, 1500.0);
        for boundary in [10.0, 20.0] {
            let below = calculate(boundary - 1e-6);
            let above = calculate(boundary + 1e-6);
            assert!((above.daily_ml - below.daily_ml).abs() < 1e-3);
            assert!((above.hourly_ml - below.hourly_ml).abs() < 1e-3);
        }
    }

    #[test]
    fn test_monotonic() {
        let mut prev = calculate(0.0);
        for i in 1..=600 {
            let r = calculate(i as f64 * 0.1);
            assert!(r.daily_ml > prev.daily_ml);
            assert!(r.hourly_ml > prev.hourly_ml);
            prev = r;
        }
    }

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight("calculate fluid for 25kg patient"), Some(25.0));
        assert_eq!(parse_weight("12.5 KG toddler"), Some(12.5));
        assert_eq!(parse_weight("no weight here"), None);
    }

    #[test]
    fn test_handle_fluid_query() {
        let a = handle_fluid_query("Calculate fluid requirements for 25kg patient");
        assert_eq!(a.result.unwrap().daily_ml, 1600.0);
        assert!(a.bullets[0].contains("1600 mL (1.6 L)"));

        let a = handle_fluid_query("calculate fluids please");
        assert!(a.result.is_none());
        assert!(a.bullets[0].contains("weight"));
    }
}
