//! `check`: verify the broker connection without touching CRM data

use crate::error::CliResult;
use crate::utils::ColoredOutput;
use chrono::{DateTime, Utc};
use zohocrm_config::AppConfig;
use zohocrm_connectors::CrmClient;

pub struct CheckCommand;

impl CheckCommand {
    pub async fn run(config: AppConfig) -> CliResult<()> {
        config.validate()?;
        let client = CrmClient::from_config(&config)?;
        let credential = client.credential().await?;

        println!(
            "{} credential resolved for {}",
            ColoredOutput::success("✓"),
            ColoredOutput::highlight(&client.connection().to_string())
        );
        println!("Region: {} ({})", credential.region, credential.region.domain());
        match credential.expires_at {
            Some(expires_at) if expires_at <= Utc::now() => println!(
                "Expires: {}",
                ColoredOutput::warning(&describe_expiry(expires_at, Utc::now()))
            ),
            Some(expires_at) => println!("Expires: {}", describe_expiry(expires_at, Utc::now())),
            None => println!("Expires: {}", ColoredOutput::dim("not reported by the broker")),
        }
        Ok(())
    }
}

fn describe_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = expires_at - now;
    if remaining.num_seconds() <= 0 {
        return format!("{} (expired)", expires_at.to_rfc3339());
    }
    let minutes = remaining.num_minutes();
    let relative = if minutes >= 1 {
        format!("in {}m", minutes)
    } else {
        format!("in {}s", remaining.num_seconds())
    };
    format!("{} ({})", expires_at.to_rfc3339(), relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_describe_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        assert_eq!(
            describe_expiry(now + Duration::minutes(59), now),
            "2026-10-16T12:59:00+00:00 (in 59m)"
        );
        assert_eq!(
            describe_expiry(now + Duration::seconds(30), now),
            "2026-10-16T12:00:30+00:00 (in 30s)"
        );
        assert!(describe_expiry(now - Duration::seconds(1), now).ends_with("(expired)"));
    }
}
