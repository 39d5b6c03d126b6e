use serde::{Deserialize, Serialize};
use std::fmt;

const SNOW: &[&str] = &["雪", "ゆき"];
const THUNDER: &[&str] = &["雷"];
const RAIN: &[&str] = &["雨", "あめ"];
const SUN: &[&str] = &["晴", "日射"];
const CLOUD: &[&str] = &["曇", "くもり"];
const CLEAR: &[&str] = &["快晴"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherCategory {
    Snow,
    Thunderstorm,
    SunnyWithThunder,
    CloudyWithThunder,
    Thunder,
    Clear,
    Sunny,
    SunnyThenCloudy,
    SunnyThenRainy,
    Cloudy,
    CloudyThenRainy,
    Rainy,
    Other,
    Unknown,
}

impl WeatherCategory {
    pub const ALL: [WeatherCategory; 14] = [
        WeatherCategory::Snow,
        WeatherCategory::Thunderstorm,
        WeatherCategory::SunnyWithThunder,
        WeatherCategory::CloudyWithThunder,
        WeatherCategory::Thunder,
        WeatherCategory::Clear,
        WeatherCategory::Sunny,
        WeatherCategory::SunnyThenCloudy,
        WeatherCategory::SunnyThenRainy,
        WeatherCategory::Cloudy,
        WeatherCategory::CloudyThenRainy,
        WeatherCategory::Rainy,
        WeatherCategory::Other,
        WeatherCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCategory::Snow => "snow",
            WeatherCategory::Thunderstorm => "thunderstorm",
            WeatherCategory::SunnyWithThunder => "sunny-with-thunder",
            WeatherCategory::CloudyWithThunder => "cloudy-with-thunder",
            WeatherCategory::Thunder => "thunder",
            WeatherCategory::Clear => "clear",
            WeatherCategory::Sunny => "sunny",
            WeatherCategory::SunnyThenCloudy => "sunny-then-cloudy",
            WeatherCategory::SunnyThenRainy => "sunny-then-rainy",
            WeatherCategory::Cloudy => "cloudy",
            WeatherCategory::CloudyThenRainy => "cloudy-then-rainy",
            WeatherCategory::Rainy => "rainy",
            WeatherCategory::Other => "other",
            WeatherCategory::Unknown => "unknown",
        }
    }

    /// Maps a free-text daytime weather summary to one category.
    ///
    /// Summaries often mention several phenomena ("晴時々曇一時雨"), so the
    /// checks run in priority order: snow, thunder, clear, sun, cloud, rain.
    pub fn classify(description: Option<&str>) -> WeatherCategory {
        let Some(text) = description else {
            return WeatherCategory::Unknown;
        };
        let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

        if has(SNOW) {
            return WeatherCategory::Snow;
        }

        if has(THUNDER) {
            return if has(RAIN) {
                WeatherCategory::Thunderstorm
            } else if has(SUN) {
                WeatherCategory::SunnyWithThunder
            } else if has(CLOUD) {
                WeatherCategory::CloudyWithThunder
            } else {
                WeatherCategory::Thunder
            };
        }

        if has(CLEAR) {
            return WeatherCategory::Clear;
        }

        if has(SUN) {
            return if has(CLOUD) {
                WeatherCategory::SunnyThenCloudy
            } else if has(RAIN) {
                WeatherCategory::SunnyThenRainy
            } else {
                WeatherCategory::Sunny
            };
        }

        if has(CLOUD) {
            return if has(RAIN) {
                WeatherCategory::CloudyThenRainy
            } else {
                WeatherCategory::Cloudy
            };
        }

        if has(RAIN) {
            return WeatherCategory::Rainy;
        }

        WeatherCategory::Other
    }
}

impl fmt::Display for WeatherCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
