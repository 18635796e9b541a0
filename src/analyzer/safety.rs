use crate::level::DensityLevel;
use serde::Serialize;

/// Density per square meter at which the risk score saturates
const RISK_SATURATION_DENSITY: f64 = 5.0;
const HOTSPOT_ALERT_PERCENT: f64 = 10.0;
const CRITICAL_AREA_ALERT_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyStatus {
    Safe,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyAssessment {
    pub overall_status: SafetyStatus,
    /// 0 to 100
    pub risk_level: f64,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn risk_score(density_per_sqm: f64) -> f64 {
    if !density_per_sqm.is_finite() {
        return 0.0;
    }
    (density_per_sqm / RISK_SATURATION_DENSITY * 100.0).clamp(0.0, 100.0)
}

pub(crate) fn assess(
    level: DensityLevel,
    density_per_sqm: f64,
    hotspot_count: usize,
    hotspot_percentage: f64,
    critical_area_percentage: f64,
) -> SafetyAssessment {
    let mut assessment = SafetyAssessment {
        overall_status: SafetyStatus::Safe,
        risk_level: risk_score(density_per_sqm),
        alerts: Vec::new(),
        recommendations: Vec::new(),
    };

    match level {
        DensityLevel::Critical => {
            assessment.overall_status = SafetyStatus::Critical;
            assessment
                .alerts
                .push("Crowd density exceeds safe limits".to_string());
            assessment
                .recommendations
                .push("Initiate crowd control measures".to_string());
            assessment
                .recommendations
                .push("Open additional exit points".to_string());
        }
        DensityLevel::High => {
            assessment.overall_status = SafetyStatus::Warning;
            assessment
                .alerts
                .push("High crowd density detected".to_string());
            assessment
                .recommendations
                .push("Monitor situation closely".to_string());
            assessment
                .recommendations
                .push("Prepare crowd control personnel".to_string());
        }
        _ => {}
    }

    if hotspot_percentage > HOTSPOT_ALERT_PERCENT {
        assessment
            .alerts
            .push(format!("Hotspots detected: {} areas", hotspot_count));
        assessment
            .recommendations
            .push("Disperse crowd from hotspot areas".to_string());
    }

    if critical_area_percentage > CRITICAL_AREA_ALERT_PERCENT {
        assessment.alerts.push(format!(
            "{:.1}% of area at critical density",
            critical_area_percentage
        ));
    }

    assessment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_score_saturates() {
        assert_eq!(risk_score(0.0), 0.0);
        assert_eq!(risk_score(2.5), 50.0);
        assert_eq!(risk_score(5.0), 100.0);
        assert_eq!(risk_score(12.0), 100.0);
        assert_eq!(risk_score(-1.0), 0.0);
        assert_eq!(risk_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_status_follows_level() {
        assert_eq!(
            assess(DensityLevel::Medium, 1.0, 0, 0.0, 0.0).overall_status,
            SafetyStatus::Safe
        );
        assert_eq!(
            assess(DensityLevel::High, 2.0, 0, 0.0, 0.0).overall_status,
            SafetyStatus::Warning
        );

        let critical = assess(DensityLevel::Critical, 4.0, 0, 0.0, 0.0);
        assert_eq!(critical.overall_status, SafetyStatus::Critical);
        assert_eq!(critical.recommendations.len(), 2);
    }

    #[test]
    fn test_area_alerts_use_strict_thresholds() {
        let at_limits = assess(DensityLevel::Low, 0.4, 2, 10.0, 5.0);
        assert!(at_limits.alerts.is_empty());

        let above = assess(DensityLevel::Low, 0.4, 2, 10.5, 5.5);
        assert_eq!(above.overall_status, SafetyStatus::Safe);
        assert_eq!(
            above.alerts,
            vec![
                "Hotspots detected: 2 areas".to_string(),
                "5.5% of area at critical density".to_string(),
            ]
        );
        assert_eq!(above.recommendations, vec!["Disperse crowd from hotspot areas"]);
    }
}
