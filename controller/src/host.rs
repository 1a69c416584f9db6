use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Publish, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use airctl_common::{
    actuator_topic, signal_for_topic, ActuatorCommand, ClimateEngine, CommandError,
    ControlConfig, ControlSnapshot, ControllerStatus, EngineEvent, RuntimeConfig,
    UserCommand, UserMode, TOPIC_CMD_BOOST, TOPIC_CMD_MODE, TOPIC_CMD_POWER, TOPIC_CMD_TARGET,
    TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_CO2, TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_VOC,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const MQTT_INBOX_CAPACITY: usize = 128;
const BOOST_EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const STATE_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);
const MAX_STALE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ClimateEngine>>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    state_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

/// Background tasks owned by the controller; aborted together on shutdown.
#[derive(Default)]
struct Timers {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Timers {
    fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.push((name, handle));
    }

    fn abort_all(self) {
        for (name, handle) in self.handles {
            debug!("stopping {name} task");
            handle.abort();
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusView {
    #[serde(flatten)]
    status: ControllerStatus,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    control: ControlConfig,
    #[serde(rename = "mqttHost")]
    mqtt_host: String,
    #[serde(rename = "mqttPort")]
    mqtt_port: u16,
    #[serde(rename = "mqttUser")]
    mqtt_user: String,
    #[serde(rename = "mqttPassSet")]
    mqtt_pass_set: bool,
    #[serde(rename = "clientId")]
    client_id: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let snapshot = store.load_snapshot().await.unwrap_or_else(|err| {
        warn!("failed to load saved controller state: {err:#}");
        None
    });
    if let Some(saved_at) = snapshot.as_ref().and_then(|snapshot| snapshot.saved_at) {
        info!("restoring controller state saved at {saved_at}");
    }

    let engine = ClimateEngine::new(runtime.control.clone(), snapshot.as_ref(), monotonic_ms())
        .context("refusing to start with invalid control configuration")?;
    if engine.target_defaulted() {
        warn!(
            "no target humidity configured, falling back to minimum {}%",
            engine.target_humidity()
        );
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options =
        MqttOptions::new(runtime.network.client_id.clone(), mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;

    let mut timers = Timers::default();
    let (inbox_tx, inbox_rx) = mpsc::channel(MQTT_INBOX_CAPACITY);
    timers.push("mqtt-poll", spawn_mqtt_loop(eventloop, inbox_tx));
    timers.push("mqtt-handler", spawn_mqtt_handler(app_state.clone(), inbox_rx));
    if let Some(period) = runtime.control.keep_alive_ms.filter(|ms| *ms > 0) {
        timers.push(
            "keep-alive",
            spawn_event_loop(
                app_state.clone(),
                Duration::from_millis(period),
                EngineEvent::Tick,
            ),
        );
    }
    timers.push(
        "boost-expiry",
        spawn_event_loop(
            app_state.clone(),
            BOOST_EXPIRY_CHECK_INTERVAL,
            EngineEvent::BoostExpiry,
        ),
    );
    if let Some(timeout) = runtime.control.sensor_stale_timeout_ms.filter(|ms| *ms > 0) {
        let period = Duration::from_millis(timeout).min(MAX_STALE_CHECK_INTERVAL);
        timers.push(
            "stale-check",
            spawn_event_loop(app_state.clone(), period, EngineEvent::StaleCheck),
        );
    }
    timers.push("state-publish", spawn_state_publish_loop(app_state.clone()));

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/power", post(handle_set_power))
        .route("/api/boost/on", post(handle_boost_on))
        .route("/api/boost/off", post(handle_boost_off))
        .route("/api/config", get(handle_get_config))
        .with_state(app_state.clone());

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    timers.abort_all();
    persist_snapshot(&app_state)
        .await
        .context("failed to persist controller state on shutdown")?;
    info!("controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_HUMIDITY,
        TOPIC_SENSOR_CO2,
        TOPIC_SENSOR_VOC,
        TOPIC_CMD_POWER,
        TOPIC_CMD_TARGET,
        TOPIC_CMD_MODE,
        TOPIC_CMD_BOOST,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

/// Polls the MQTT event loop and hands incoming publishes to the handler
/// task. This task never waits on the engine lock, so the client request
/// queue keeps draining while a tick is publishing.
fn spawn_mqtt_loop(
    mut eventloop: rumqttc::EventLoop,
    inbox: mpsc::Sender<Publish>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if !forward_publish(&inbox, message) {
                        warn!("mqtt inbox closed, stopping poll loop");
                        break;
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

/// Queues a publish for the handler without waiting. A full inbox drops the
/// message; returns false once the handler is gone.
fn forward_publish(inbox: &mpsc::Sender<Publish>, message: Publish) -> bool {
    match inbox.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            warn!("mqtt inbox full, dropping message on {}", message.topic);
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

fn spawn_mqtt_handler(app_state: AppState, mut inbox: mpsc::Receiver<Publish>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            if let Err(err) =
                handle_mqtt_message(&app_state, &message.topic, message.payload.to_vec()).await
            {
                warn!("mqtt message handling error: {err:#}");
            }
        }
    })
}

/// Feeds `event` to the engine every `period`, starting one period from now.
fn spawn_event_loop(app_state: AppState, period: Duration, event: EngineEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);

        loop {
            interval.tick().await;
            if let Err(err) = apply_event(&app_state, event.clone()).await {
                warn!("timer event {event:?} failed: {err:#}");
            }
        }
    })
}

fn spawn_state_publish_loop(app_state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PUBLISH_INTERVAL);
        loop {
            interval.tick().await;

            let now_ms = monotonic_ms();
            let payload = {
                let engine = app_state.engine.lock().await;
                serde_json::to_vec(&engine.state_payload(now_ms))
            };

            match payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    })
}

/// Runs one engine event under the lock, dispatches its commands before the
/// lock is released, then persists the snapshot if control state moved.
async fn apply_event(app_state: &AppState, event: EngineEvent) -> anyhow::Result<()> {
    let changed = {
        let mut engine = app_state.engine.lock().await;
        let now_ms = monotonic_ms();
        let before = engine.snapshot(now_ms);
        let output = engine.handle(event, now_ms);

        for err in &output.sensor_errors {
            warn!("{err}");
        }
        if output.deactivated {
            warn!("primary humidity sensor lost, all actuators switched off");
        }
        dispatch_commands(&app_state.mqtt, &output.commands).await;

        !engine.snapshot(now_ms).same_control_state(&before)
    };

    if changed {
        persist_snapshot(app_state).await?;
    }
    Ok(())
}

async fn dispatch_commands(mqtt: &AsyncClient, commands: &[ActuatorCommand]) {
    for command in commands {
        info!(
            "{} -> {:?}",
            command.actuator.as_str(),
            command.command
        );
        let topic = actuator_topic(command.actuator);
        if let Err(err) = mqtt
            .publish(topic, QoS::AtLeastOnce, false, command.command.payload())
            .await
        {
            let err = CommandError {
                actuator: command.actuator,
                reason: err.to_string(),
            };
            warn!("{err}");
        }
    }
}

async fn persist_snapshot(app_state: &AppState) -> anyhow::Result<()> {
    let snapshot = {
        let engine = app_state.engine.lock().await;
        engine.snapshot(monotonic_ms())
    };
    app_state
        .store
        .save_snapshot(&snapshot.stamped(Utc::now()))
        .await
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    if let Some(signal) = signal_for_topic(topic) {
        apply_event(
            app_state,
            EngineEvent::SensorUpdate {
                signal,
                raw: message,
            },
        )
        .await?;
        return Ok(());
    }

    let command = match topic {
        TOPIC_CMD_POWER => parse_power(&message),
        TOPIC_CMD_TARGET => message
            .trim()
            .parse::<f64>()
            .ok()
            .map(UserCommand::SetTargetHumidity),
        TOPIC_CMD_MODE => UserMode::parse(message.trim()).map(UserCommand::SetMode),
        TOPIC_CMD_BOOST => {
            let max_minutes = app_state.engine.lock().await.config.max_boost_minutes;
            parse_boost(&message, max_minutes)
        }
        _ => None,
    };

    match command {
        Some(command) => {
            apply_event(app_state, EngineEvent::User(command)).await?;
        }
        None => debug!("ignoring {topic} payload {message:?}"),
    }
    Ok(())
}

fn parse_power(value: &str) -> Option<UserCommand> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" => Some(UserCommand::TurnOn),
        "off" => Some(UserCommand::TurnOff),
        _ => None,
    }
}

/// Accepts `on`, `off`, or a duration in minutes for the boost command topic.
fn parse_boost(value: &str, max_minutes: u16) -> Option<UserCommand> {
    let lower = value.trim().to_ascii_lowercase();
    match lower.as_str() {
        "on" => Some(UserCommand::BoostOn(None)),
        "off" => Some(UserCommand::BoostOff),
        _ => lower
            .parse::<u64>()
            .ok()
            .map(|minutes| UserCommand::BoostOn(boost_duration_ms(minutes, max_minutes))),
    }
}

/// Zero minutes selects the configured default duration.
fn boost_duration_ms(minutes: u64, max_minutes: u16) -> Option<u64> {
    (minutes > 0).then(|| minutes.min(u64::from(max_minutes)) * 60_000)
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = {
        let engine = state.engine.lock().await;
        engine.status(monotonic_ms())
    };
    Json(StatusView {
        status,
        now_epoch: Utc::now().timestamp(),
    })
}

async fn handle_user_command(state: AppState, command: UserCommand) -> axum::response::Response {
    if let Err(err) = apply_event(&state, EngineEvent::User(command)).await {
        warn!("failed to persist controller state: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist controller state",
        );
    }
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(target) = value.parse::<f64>().ok().filter(|target| target.is_finite()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid humidity value");
    };
    handle_user_command(state, UserCommand::SetTargetHumidity(target)).await
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = UserMode::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'NORMAL' or 'AWAY'",
        );
    };
    if mode == UserMode::Away && !state.engine.lock().await.config.has_away_mode() {
        return error_response(StatusCode::BAD_REQUEST, "Away mode is not configured");
    }
    handle_user_command(state, UserCommand::SetMode(mode)).await
}

async fn handle_set_power(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(command) = parse_power(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid power value. Use 'ON' or 'OFF'");
    };
    handle_user_command(state, command).await
}

async fn handle_boost_on(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let minutes = match params.get("minutes") {
        None => 0,
        Some(value) => match value.parse::<u64>() {
            Ok(minutes) => minutes,
            Err(_) => {
                return error_response(StatusCode::BAD_REQUEST, "Invalid 'minutes' parameter")
            }
        },
    };
    let max_minutes = state.engine.lock().await.config.max_boost_minutes;
    let duration_ms = boost_duration_ms(minutes, max_minutes);
    handle_user_command(state, UserCommand::BoostOn(duration_ms)).await
}

async fn handle_boost_off(State(state): State<AppState>) -> impl IntoResponse {
    handle_user_command(state, UserCommand::BoostOff).await
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state
        .store
        .load_runtime_config()
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load runtime config from store: {err:#}");
            RuntimeConfig::default()
        });
    let control = state.engine.lock().await.config.clone();

    Json(ConfigView {
        control,
        mqtt_host: runtime.network.mqtt_host,
        mqtt_port: runtime.network.mqtt_port,
        mqtt_user: runtime.network.mqtt_user,
        mqtt_pass_set: !runtime.network.mqtt_pass.is_empty(),
        client_id: runtime.network.client_id,
    })
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("AIRCTL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.airctl"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            state_path: Arc::new(data_dir.join("state.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_snapshot(&self) -> anyhow::Result<Option<ControlSnapshot>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.state_path.as_ref()).await {
            Ok(raw) => Ok(Some(serde_json::from_slice::<ControlSnapshot>(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_snapshot(&self, snapshot: &ControlSnapshot) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.state_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_minutes_are_capped() {
        assert_eq!(boost_duration_ms(0, 240), None);
        assert_eq!(boost_duration_ms(15, 240), Some(900_000));
        assert_eq!(boost_duration_ms(1_000, 240), Some(240 * 60_000));
    }

    #[test]
    fn boost_topic_payloads() {
        assert_eq!(parse_boost("ON", 240), Some(UserCommand::BoostOn(None)));
        assert_eq!(parse_boost(" off ", 240), Some(UserCommand::BoostOff));
        assert_eq!(
            parse_boost("20", 240),
            Some(UserCommand::BoostOn(Some(1_200_000)))
        );
        assert_eq!(parse_boost("soon", 240), None);
    }

    #[test]
    fn full_inbox_drops_instead_of_blocking_the_poll_loop() {
        let (tx, mut rx) = mpsc::channel(1);
        let reading = |raw: &str| Publish::new(TOPIC_SENSOR_HUMIDITY, QoS::AtMostOnce, raw);

        assert!(forward_publish(&tx, reading("41.0")));
        assert!(forward_publish(&tx, reading("42.0")));

        let queued = rx.try_recv().unwrap();
        assert_eq!(&queued.payload[..], b"41.0");
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(!forward_publish(&tx, reading("43.0")));
    }

    #[test]
    fn power_payloads_are_case_insensitive() {
        assert_eq!(parse_power("On"), Some(UserCommand::TurnOn));
        assert_eq!(parse_power("OFF\n"), Some(UserCommand::TurnOff));
        assert_eq!(parse_power("toggle"), None);
    }
}
