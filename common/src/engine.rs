use crate::{
    arbitration::{air_quality, arbitrate, Readings},
    boost::BoostController,
    config::{ControlConfig, VentilationOutput},
    error::{ConfigError, SensorError},
    guard::DurationGuard,
    levels::fan_percent_for,
    readings::ReadingStore,
    snapshot::ControlSnapshot,
    types::{
        Actuator, ActuatorCommand, AirQuality, Command, ControllerStatePayload, ControllerStatus,
        EngineEvent, OperatingMode, Signal, Trigger, UserCommand, UserMode, VentilationReason,
    },
};

/// Everything a single engine call produced: commands to dispatch in order,
/// plus any sensor failures the host should log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub commands: Vec<ActuatorCommand>,
    pub sensor_errors: Vec<SensorError>,
    pub deactivated: bool,
}

impl From<Vec<ActuatorCommand>> for EngineOutput {
    fn from(commands: Vec<ActuatorCommand>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClimateEngine {
    pub config: ControlConfig,

    readings: ReadingStore,
    boost: BoostController,

    ventilation: DurationGuard,
    humidifier: DurationGuard,
    wet: DurationGuard,
    dry: DurationGuard,
    ventilation_reason: VentilationReason,

    target_humidity: f64,
    saved_target_humidity: Option<f64>,
    target_defaulted: bool,
    is_away: bool,

    enabled: bool,
    active: bool,
    operating_mode: OperatingMode,
    air_quality: AirQuality,
}

impl ClimateEngine {
    pub fn new(
        config: ControlConfig,
        snapshot: Option<&ControlSnapshot>,
        now_ms: u64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let vent_max = config.ventilation_max_level();
        let hum_max = config.humidifier_max_level();

        let mut target = config.target_humidity;
        let mut saved_target = config.away_humidity.or(config.target_humidity);
        let mut is_away = false;
        let mut enabled = config.initial_enabled.unwrap_or(false);
        let mut operating_mode = OperatingMode::Disabled;
        let mut ventilation = DurationGuard::new(config.min_ventilate_ms);
        let mut humidifier = DurationGuard::new(config.min_humidify_ms);
        let mut wet = DurationGuard::new(config.min_cycle_ms);
        let mut dry = DurationGuard::new(config.min_cycle_ms);
        let mut ventilation_reason = VentilationReason::None;
        let mut boost = BoostController::new();

        if let Some(snapshot) = snapshot {
            if snapshot.mode == UserMode::Away {
                is_away = true;
                saved_target = target;
                target = config.away_humidity.or(target);
            }
            if let Some(restored) = snapshot.target_humidity {
                target = Some(restored);
            }
            if let Some(restored) = snapshot.saved_target_humidity {
                saved_target = Some(restored);
            }
            enabled = snapshot.enabled;
            operating_mode = snapshot.operating_mode;

            ventilation = DurationGuard::restored(
                config.min_ventilate_ms,
                snapshot.ventilation_level.min(vent_max),
            );
            humidifier = DurationGuard::restored(
                config.min_humidify_ms,
                snapshot.humidifier_level.min(hum_max),
            );
            wet = DurationGuard::restored(
                config.min_cycle_ms,
                usize::from(snapshot.wet_on && config.wet_output),
            );
            dry = DurationGuard::restored(
                config.min_cycle_ms,
                usize::from(snapshot.dry_on && config.dry_output),
            );
            ventilation_reason = snapshot.ventilation_reason;

            if let Some(remaining) = snapshot.boost_remaining_ms.filter(|ms| *ms > 0) {
                boost.activate(remaining, now_ms);
            }
        }

        let target_defaulted = target.is_none();
        let target_humidity = config.clamp_humidity(target.unwrap_or(config.min_humidity));

        Ok(Self {
            readings: ReadingStore::new(config.sensor_stale_timeout_ms),
            boost,
            ventilation,
            humidifier,
            wet,
            dry,
            ventilation_reason,
            target_humidity,
            saved_target_humidity: saved_target,
            target_defaulted,
            is_away,
            enabled,
            active: false,
            operating_mode,
            air_quality: AirQuality::Unknown,
            config,
        })
    }

    pub fn readings(&self) -> &ReadingStore {
        &self.readings
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.readings.humidity()
    }

    pub fn target_humidity(&self) -> f64 {
        self.target_humidity
    }

    pub fn saved_target_humidity(&self) -> Option<f64> {
        self.saved_target_humidity
    }

    /// True when neither config nor snapshot supplied a target and the
    /// minimum humidity was used instead.
    pub fn target_defaulted(&self) -> bool {
        self.target_defaulted
    }

    pub fn mode(&self) -> UserMode {
        if self.is_away {
            UserMode::Away
        } else {
            UserMode::Normal
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn operating_mode(&self) -> OperatingMode {
        self.operating_mode
    }

    pub fn air_quality(&self) -> AirQuality {
        self.air_quality
    }

    pub fn ventilation_level(&self) -> usize {
        self.ventilation.level()
    }

    pub fn ventilation_reason(&self) -> VentilationReason {
        self.ventilation_reason
    }

    pub fn humidifier_level(&self) -> usize {
        self.humidifier.level()
    }

    pub fn is_wet_on(&self) -> bool {
        self.wet.level() > 0
    }

    pub fn is_dry_on(&self) -> bool {
        self.dry.level() > 0
    }

    pub fn is_boost_active(&self) -> bool {
        self.boost.is_active()
    }

    pub fn boost_remaining_ms(&self, now_ms: u64) -> u64 {
        self.boost.remaining_ms(now_ms)
    }

    pub fn handle(&mut self, event: EngineEvent, now_ms: u64) -> EngineOutput {
        match event {
            EngineEvent::SensorUpdate { signal, raw } => self.ingest(signal, &raw, now_ms),
            EngineEvent::Tick => self.on_tick(Trigger::KeepAlive, false, now_ms).into(),
            EngineEvent::StaleCheck => self.check_stale(now_ms),
            EngineEvent::BoostExpiry => self.check_boost_expiry(now_ms).into(),
            EngineEvent::User(command) => self.handle_user(command, now_ms).into(),
        }
    }

    fn handle_user(&mut self, command: UserCommand, now_ms: u64) -> Vec<ActuatorCommand> {
        match command {
            UserCommand::TurnOn => self.turn_on(now_ms),
            UserCommand::TurnOff => self.turn_off(now_ms),
            UserCommand::SetTargetHumidity(value) => self.set_target_humidity(value, now_ms).1,
            UserCommand::SetMode(mode) => self.set_mode(mode, now_ms).1,
            UserCommand::BoostOn(duration_ms) => self.on_boost_activate(duration_ms, now_ms),
            UserCommand::BoostOff => self.on_boost_deactivate(now_ms),
        }
    }

    /// Feeds one raw sensor value in and re-evaluates.
    pub fn ingest(&mut self, signal: Signal, raw: &str, now_ms: u64) -> EngineOutput {
        match self.readings.update(signal, raw, now_ms) {
            Ok(_) => self.on_tick(Trigger::SensorUpdate, false, now_ms).into(),
            Err(err) => {
                let mut output = self.sensor_failed(err, now_ms);
                if !signal.is_primary() {
                    output
                        .commands
                        .extend(self.on_tick(Trigger::SensorUpdate, false, now_ms));
                }
                output
            }
        }
    }

    /// Synthesizes a sensor failure for every signal whose stale window ran out.
    pub fn check_stale(&mut self, now_ms: u64) -> EngineOutput {
        let mut output = EngineOutput::default();
        for err in self.readings.check_stale(now_ms) {
            let failed = self.sensor_failed(err, now_ms);
            output.commands.extend(failed.commands);
            output.sensor_errors.extend(failed.sensor_errors);
            output.deactivated |= failed.deactivated;
        }
        output
    }

    fn sensor_failed(&mut self, err: SensorError, now_ms: u64) -> EngineOutput {
        let mut output = EngineOutput::default();
        if err.signal().is_primary() {
            let was_active = self.active;
            output.deactivated = was_active;
            self.active = false;
            self.operating_mode = OperatingMode::Disabled;
            output.commands = self.all_off(was_active, now_ms);
        }
        output.sensor_errors.push(err);
        output
    }

    pub fn turn_on(&mut self, now_ms: u64) -> Vec<ActuatorCommand> {
        self.enabled = true;
        self.on_tick(Trigger::UserCommand, true, now_ms)
    }

    pub fn turn_off(&mut self, now_ms: u64) -> Vec<ActuatorCommand> {
        self.enabled = false;
        self.boost.deactivate();
        self.operating_mode = OperatingMode::Disabled;
        self.all_off(true, now_ms)
    }

    /// Returns whether the live target changed, and the resulting commands.
    pub fn set_target_humidity(&mut self, humidity: f64, now_ms: u64) -> (bool, Vec<ActuatorCommand>) {
        if !humidity.is_finite() {
            return (false, Vec::new());
        }
        let clamped = self.config.clamp_humidity(humidity);

        if self.is_away && self.config.away_fixed {
            self.saved_target_humidity = Some(clamped);
            return (false, Vec::new());
        }

        let changed = (self.target_humidity - clamped).abs() > f64::EPSILON;
        self.target_humidity = clamped;
        (changed, self.on_tick(Trigger::UserCommand, false, now_ms))
    }

    pub fn set_mode(&mut self, mode: UserMode, now_ms: u64) -> (bool, Vec<ActuatorCommand>) {
        let mut changed = false;
        match mode {
            UserMode::Away => {
                if let Some(away) = self.config.away_humidity {
                    changed = !self.is_away;
                    if !self.is_away {
                        self.saved_target_humidity = Some(self.target_humidity);
                    }
                    self.is_away = true;
                    self.target_humidity = self.config.clamp_humidity(away);
                }
            }
            UserMode::Normal => {
                changed = self.is_away;
                if self.is_away {
                    if let Some(saved) = self.saved_target_humidity {
                        self.target_humidity = self.config.clamp_humidity(saved);
                    }
                }
                self.is_away = false;
            }
        }

        (changed, self.on_tick(Trigger::UserCommand, true, now_ms))
    }

    pub fn on_boost_activate(&mut self, duration_ms: Option<u64>, now_ms: u64) -> Vec<ActuatorCommand> {
        let duration_ms = duration_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.config.boost_duration_ms);
        self.boost.activate(duration_ms, now_ms);
        self.on_tick(Trigger::BoostStart, true, now_ms)
    }

    pub fn on_boost_deactivate(&mut self, now_ms: u64) -> Vec<ActuatorCommand> {
        if self.boost.deactivate() {
            self.on_tick(Trigger::BoostEnd, true, now_ms)
        } else {
            Vec::new()
        }
    }

    pub fn check_boost_expiry(&mut self, now_ms: u64) -> Vec<ActuatorCommand> {
        if self.boost.check_expiry(now_ms) {
            self.on_tick(Trigger::BoostEnd, true, now_ms)
        } else {
            Vec::new()
        }
    }

    /// One evaluation pass. `force` skips the duration guards.
    pub fn on_tick(&mut self, trigger: Trigger, force: bool, now_ms: u64) -> Vec<ActuatorCommand> {
        let mut commands = Vec::new();
        let mut force = force;

        if self.boost.check_expiry(now_ms) {
            force = true;
        }

        if !self.active && self.readings.humidity().is_some() {
            self.active = true;
            force = true;
        }

        if !self.active || !self.enabled {
            self.operating_mode = OperatingMode::Disabled;
            return commands;
        }

        let readings = Readings {
            humidity: self.readings.humidity(),
            co2: self.readings.co2(),
            voc: self.readings.voc(),
        };
        self.air_quality = air_quality(&readings, &self.config);

        if self.boost.is_active() {
            let levels = BoostController::levels(
                readings.humidity,
                self.target_humidity,
                self.config.dry_tolerance,
                self.config.ventilation_levels.len(),
                self.config.humidifier_levels.len(),
                self.config.boost_humidifier_level,
            );
            self.drive(Actuator::Ventilation, levels.ventilation, true, now_ms, &mut commands);
            self.ventilation_reason = VentilationReason::Boost;
            self.drive(Actuator::Humidifier, levels.humidifier, true, now_ms, &mut commands);
            self.operating_mode = OperatingMode::Boost;
            return commands;
        }

        let decision = arbitrate(&readings, self.target_humidity, &self.config);

        let applied = self.drive(
            Actuator::Ventilation,
            decision.ventilation_level,
            force,
            now_ms,
            &mut commands,
        );
        if applied == decision.ventilation_level {
            self.ventilation_reason = decision.ventilation_reason;
        } else if applied == 0 {
            self.ventilation_reason = VentilationReason::None;
        } else if self.ventilation_reason == VentilationReason::Boost {
            self.ventilation_reason = decision.ventilation_reason;
        }
        self.drive(
            Actuator::Humidifier,
            decision.humidifier_level,
            force,
            now_ms,
            &mut commands,
        );

        // Release one side of the pair before engaging the other. While the
        // releasing side is held on by its guard the other side stays off.
        let keep_alive = trigger == Trigger::KeepAlive;
        let ((release, release_on), (engage, engage_on)) = if decision.wet_on {
            ((Actuator::Dry, decision.dry_on), (Actuator::Wet, decision.wet_on))
        } else {
            ((Actuator::Wet, decision.wet_on), (Actuator::Dry, decision.dry_on))
        };
        let held = self.drive_switch(
            release,
            release_on,
            force,
            keep_alive,
            now_ms,
            &mut commands,
        );
        self.drive_switch(
            engage,
            engage_on && !held,
            force,
            keep_alive,
            now_ms,
            &mut commands,
        );

        self.operating_mode = decision.mode;
        commands
    }

    pub fn snapshot(&self, now_ms: u64) -> ControlSnapshot {
        ControlSnapshot {
            enabled: self.enabled,
            mode: self.mode(),
            target_humidity: Some(self.target_humidity),
            saved_target_humidity: self.saved_target_humidity,
            operating_mode: self.operating_mode,
            ventilation_level: self.ventilation.level(),
            ventilation_reason: self.ventilation_reason,
            humidifier_level: self.humidifier.level(),
            wet_on: self.is_wet_on(),
            dry_on: self.is_dry_on(),
            boost_remaining_ms: self
                .boost
                .is_active()
                .then(|| self.boost.remaining_ms(now_ms)),
            saved_at: None,
        }
    }

    pub fn status(&self, now_ms: u64) -> ControllerStatus {
        let mut available_modes = vec![UserMode::Normal.as_str()];
        if self.config.has_away_mode() {
            available_modes.push(UserMode::Away.as_str());
        }

        ControllerStatus {
            enabled: self.enabled,
            active: self.active,
            current_humidity: self.readings.humidity(),
            co2: self.readings.co2(),
            voc: self.readings.voc(),
            target_humidity: self.target_humidity,
            saved_humidity: self.saved_target_humidity,
            min_humidity: self.config.min_humidity,
            max_humidity: self.config.max_humidity,
            mode: self.mode().as_str(),
            available_modes,
            operating_mode: self.operating_mode.as_str(),
            action: self.operating_mode.action().as_str(),
            air_quality: self.air_quality.as_str(),
            ventilation_level: self.ventilation.level(),
            ventilation_level_name: level_name(&self.config.ventilation_levels, self.ventilation.level()),
            ventilation_reason: self.ventilation_reason.as_str(),
            humidifier_level: self.humidifier.level(),
            humidifier_level_name: level_name(&self.config.humidifier_levels, self.humidifier.level()),
            wet_on: self.is_wet_on(),
            dry_on: self.is_dry_on(),
            boost_active: self.boost.is_active(),
            boost_remaining_ms: self.boost.remaining_ms(now_ms),
            boost_remaining_min: self.boost.remaining_ms(now_ms) / 60_000,
            stale_signals: self
                .readings
                .stale_signals()
                .into_iter()
                .map(Signal::as_str)
                .collect(),
        }
    }

    pub fn state_payload(&self, now_ms: u64) -> ControllerStatePayload {
        ControllerStatePayload {
            humidity: self.readings.humidity(),
            co2: self.readings.co2(),
            voc: self.readings.voc(),
            target: self.target_humidity,
            mode: self.mode().as_str(),
            operating_mode: self.operating_mode.as_str(),
            action: self.operating_mode.action().as_str(),
            air_quality: self.air_quality.as_str(),
            ventilation: self.ventilation.level(),
            humidifier: self.humidifier.level(),
            boost_active: self.boost.is_active(),
            boost_remaining_min: self.boost.remaining_ms(now_ms) / 60_000,
        }
    }

    /// Moves every actuator to off. With `unconditional` the off command is
    /// sent even to actuators already believed to be off.
    fn all_off(&mut self, unconditional: bool, now_ms: u64) -> Vec<ActuatorCommand> {
        let mut commands = Vec::new();
        for actuator in Actuator::ALL {
            if !self.is_configured(actuator) {
                continue;
            }
            let emitted = commands.len();
            self.drive(actuator, 0, true, now_ms, &mut commands);
            if unconditional && commands.len() == emitted {
                commands.push(ActuatorCommand::new(actuator, self.command_for(actuator, 0)));
            }
        }
        self.ventilation_reason = VentilationReason::None;
        commands
    }

    /// Routes a requested level through the actuator's guard and emits a
    /// command when the commanded level changes. Returns the applied level.
    fn drive(
        &mut self,
        actuator: Actuator,
        requested: usize,
        force: bool,
        now_ms: u64,
        commands: &mut Vec<ActuatorCommand>,
    ) -> usize {
        if !self.is_configured(actuator) {
            return 0;
        }
        let requested = requested.min(self.max_level(actuator));
        let guard = self.guard_mut(actuator);
        let previous = guard.level();
        let applied = if force {
            guard.force(requested, now_ms)
        } else {
            guard.permit(requested, now_ms)
        };
        if applied != previous {
            commands.push(ActuatorCommand::new(actuator, self.command_for(actuator, applied)));
        }
        applied
    }

    /// Drives one side of the wet/dry pair. Keep-alive ticks re-send the
    /// current state when nothing changed. Returns whether the switch is on.
    fn drive_switch(
        &mut self,
        actuator: Actuator,
        on: bool,
        force: bool,
        keep_alive: bool,
        now_ms: u64,
        commands: &mut Vec<ActuatorCommand>,
    ) -> bool {
        let emitted = commands.len();
        let applied = self.drive(actuator, usize::from(on), force, now_ms, commands);
        if keep_alive && commands.len() == emitted && self.is_configured(actuator) {
            commands.push(ActuatorCommand::new(actuator, self.command_for(actuator, applied)));
        }
        applied > 0
    }

    fn command_for(&self, actuator: Actuator, level: usize) -> Command {
        match actuator {
            Actuator::Ventilation => match self.config.ventilation_output {
                VentilationOutput::Named => {
                    Command::SetLevel(level_name(&self.config.ventilation_levels, level))
                }
                VentilationOutput::Percent if level == 0 => Command::TurnOff,
                VentilationOutput::Percent => Command::SetFanPercent(fan_percent_for(
                    level,
                    self.config.ventilation_levels.len(),
                )),
            },
            Actuator::Humidifier => {
                Command::SetLevel(level_name(&self.config.humidifier_levels, level))
            }
            Actuator::Wet | Actuator::Dry => {
                if level > 0 {
                    Command::TurnOn
                } else {
                    Command::TurnOff
                }
            }
        }
    }

    fn is_configured(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Wet => self.config.wet_output,
            Actuator::Dry => self.config.dry_output,
            Actuator::Ventilation | Actuator::Humidifier => true,
        }
    }

    fn max_level(&self, actuator: Actuator) -> usize {
        match actuator {
            Actuator::Ventilation => self.config.ventilation_max_level(),
            Actuator::Humidifier => self.config.humidifier_max_level(),
            Actuator::Wet | Actuator::Dry => 1,
        }
    }

    fn guard_mut(&mut self, actuator: Actuator) -> &mut DurationGuard {
        match actuator {
            Actuator::Ventilation => &mut self.ventilation,
            Actuator::Humidifier => &mut self.humidifier,
            Actuator::Wet => &mut self.wet,
            Actuator::Dry => &mut self.dry,
        }
    }
}

fn level_name(levels: &[String], level: usize) -> String {
    levels
        .get(level)
        .or_else(|| levels.last())
        .cloned()
        .unwrap_or_default()
}
