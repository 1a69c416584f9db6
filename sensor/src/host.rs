use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, info, warn};

use airctl_common::{sensor_topic, Signal, TOPIC_SENSOR_STATUS};

const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 30;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let interval_secs = std::env::var("SENSOR_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_PUBLISH_INTERVAL_SECS);

    let mut mqtt_options = MqttOptions::new("airctl-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(rumqttc::LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("sensor publisher started, interval {interval_secs}s");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        for signal in Signal::ALL {
            let payload = simulated_reading(signal, tick);
            debug!("{} = {payload}", signal.as_str());
            mqtt.publish(sensor_topic(signal), QoS::AtLeastOnce, true, payload)
                .await
                .with_context(|| format!("failed to publish {} reading", signal.as_str()))?;
        }
    }
}

// Stand-in until a real SHT/SCD/SGP driver is wired in.
fn simulated_reading(signal: Signal, tick: u64) -> String {
    match signal {
        Signal::Humidity => format!("{:.1}", 42.0 + (tick % 6) as f64 * 0.5),
        Signal::Co2 => format!("{:.0}", 650.0 + (tick % 10) as f64 * 40.0),
        Signal::Voc => format!("{:.0}", 120.0 + (tick % 5) as f64 * 25.0),
    }
}
