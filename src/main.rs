use std::io::{self, BufRead, Write};

use anyhow::Result;
use zipcast_core::Config;
use zipcast_weather::{
    Cache, ConfiguredProvider, Forecast, ForecastByAddress, ForecastError, ForecastResult,
    Geocoder, GeocodingClient, MemoryCache, OpenWeatherClient, WeatherClient,
};

/// Trim the submitted text and run the lookup, returning the message to show
/// on failure.
async fn submit_address<G, W, C>(
    use_case: &ForecastByAddress<G, W, C>,
    raw: &str,
) -> Result<ForecastResult, String>
where
    G: GeocodingClient,
    W: WeatherClient,
    C: Cache<Forecast>,
{
    let address = raw.trim();
    if address.is_empty() {
        return Err(ForecastError::BlankAddress.user_message().to_string());
    }

    use_case.call(address).await.map_err(|e| {
        if let ForecastError::Weather(inner) = &e {
            tracing::error!(kind = inner.kind(), "Forecast lookup failed");
        }
        e.user_message().to_string()
    })
}

fn render(result: &ForecastResult) -> String {
    let forecast = &result.forecast;
    let mut out = format!(
        "Zip Code {}{}\n",
        result.zip_code,
        if result.from_cache { " (cached)" } else { "" }
    );
    out.push_str(&format!(
        "Currently {:.0}°F, {}\n",
        forecast.current_temp, forecast.current_description
    ));
    out.push_str(&format!(
        "Today: high {:.0}°F / low {:.0}°F\n",
        forecast.today_high, forecast.today_low
    ));
    for day in &forecast.daily {
        out.push_str(&format!(
            "  {}  {:>4.0}°F / {:>4.0}°F  {}\n",
            day.date.format("%a %b %-d"),
            day.high,
            day.low,
            day.description
        ));
    }
    out
}

async fn lookup_and_print<G, W, C>(use_case: &ForecastByAddress<G, W, C>, raw: &str)
where
    G: GeocodingClient,
    W: WeatherClient,
    C: Cache<Forecast>,
{
    match submit_address(use_case, raw).await {
        Ok(result) => print!("{}", render(&result)),
        Err(message) => println!("{}", message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    zipcast_core::init()?;
    tracing::debug!("Config file: {}", Config::config_path()?.display());

    let (config, _) = Config::load_validated()?;

    let geocoder = Geocoder::new(ConfiguredProvider::from_config(&config.geocoding)?);
    let weather = OpenWeatherClient::from_config(&config.weather)?;
    let use_case = ForecastByAddress::new(
        geocoder,
        weather,
        MemoryCache::new(),
        config.forecasts.cache_ttl(),
    );

    tracing::info!("Zipcast ready");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        lookup_and_print(&use_case, &args.join(" ")).await;
        return Ok(());
    }

    let stdin = io::stdin();
    loop {
        print!("Address: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        lookup_and_print(&use_case, &line).await;
    }

    Ok(())
}
