use std::{convert::Infallible, path::PathBuf, sync::Arc};

use clap::Parser;
use embassy_executor::{Executor, Spawner};
use embassy_time::{Duration, Instant, Ticker, Timer};
use embedded_hal::digital::{ErrorType, OutputPin};
use swb_core::{
    mk_static,
    utils::{
        config::{ConfigError, RobotConfig},
        connection::TopicBus,
        controllers::{Imu, Motor, SwerveModule},
        math::{
            geometry::Rotation2d,
            kinematics::{ModulePosition, ModuleState},
            trajectory::Alliance,
        },
        robot::{autos::AutoRoutine, RobotContainer, RobotHardware},
    },
};
use tracing::{error, info, trace, warn};

const TICK: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// JSON robot config; defaults are used for anything it leaves out
    #[clap(long)]
    config: Option<PathBuf>,
    /// Autonomous routine, e.g. `place_cone_balance`
    #[clap(long)]
    auto: Option<String>,
    /// `blue` or `red`
    #[clap(long)]
    alliance: Option<String>,
    /// Stop after this many ticks
    #[clap(long)]
    ticks: Option<u64>,
    /// Length of the autonomous period in seconds
    #[clap(long, default_value_t = 15.0)]
    auto_secs: f32,
}

/// Module that drives exactly the speed it is asked for.
#[derive(Default)]
struct SimModule {
    state: ModuleState,
    distance: f32,
}

impl SwerveModule for SimModule {
    fn set_desired_state(
        &mut self,
        state: ModuleState,
    ) {
        self.state = state;
    }

    fn position(&self) -> ModulePosition {
        ModulePosition::new(self.distance, self.state.angle)
    }

    fn state(&self) -> ModuleState {
        self.state
    }

    fn periodic(&mut self) {
        self.distance += self.state.speed * TICK.as_micros() as f32 / 1_000_000.0;
    }
}

struct SimImu;

impl Imu for SimImu {
    fn heading(&self) -> Rotation2d {
        Rotation2d::ZERO
    }

    fn accel_x(&self) -> f32 {
        0.0
    }
}

/// Motor whose encoder follows its output.
struct SimMotor {
    name: &'static str,
    position: f32,
}

impl SimMotor {
    fn boxed(name: &'static str) -> Box<dyn Motor> {
        Box::new(Self { name, position: 0.0 })
    }
}

impl Motor for SimMotor {
    fn set(
        &mut self,
        output: f32,
    ) {
        self.position += output * 2.0;
        trace!(motor = self.name, output, position = self.position, "Motor");
    }

    fn position(&self) -> f32 {
        self.position
    }
}

struct SimPin(&'static str);

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        trace!(pin = self.0, "low");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        trace!(pin = self.0, "high");
        Ok(())
    }
}

fn hardware() -> RobotHardware<SimPin> {
    RobotHardware {
        modules: core::array::from_fn(|_| Box::new(SimModule::default()) as Box<dyn SwerveModule>),
        imu: Box::new(SimImu),
        intake: SimMotor::boxed("intake"),
        wheels: SimMotor::boxed("wheels"),
        elevator: SimMotor::boxed("elevator"),
        winch: SimMotor::boxed("winch"),
        climb_servo: SimMotor::boxed("climb_servo"),
        climb_motors: SimMotor::boxed("climb_motors"),
        claw: SimPin("claw"),
        pivot: SimPin("pivot"),
        indicator: [SimPin("led0"), SimPin("led1"), SimPin("led2")],
    }
}

fn load_config(opts: &Opts) -> Result<RobotConfig, ConfigError> {
    let mut config = match &opts.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).unwrap_or_else(|e| {
                warn!(?path, error = %e, "Config unreadable, using defaults");
                String::from("{}")
            });
            RobotConfig::from_json(&json)?
        }
        None => RobotConfig::default(),
    };
    if let Some(auto) = &opts.auto {
        config.auto.routine = serde_json::from_value::<AutoRoutine>(serde_json::Value::String(auto.clone()))?;
    }
    if let Some(alliance) = &opts.alliance {
        config.alliance = serde_json::from_value::<Alliance>(serde_json::Value::String(alliance.clone()))?;
    }
    Ok(config)
}

/// Publishes a camera pose near the blue start every 80-120 ms, stamped 30 ms
/// in the past like a real capture.
#[embassy_executor::task]
async fn vision_task(bus: Arc<TopicBus>) -> ! {
    let mut frame: u64 = 0;
    loop {
        Timer::after(Duration::from_millis(80 + (frame * 37) % 40)).await;
        frame += 1;
        let captured = Instant::now()
            .checked_sub(Duration::from_millis(30))
            .unwrap_or(Instant::from_ticks(0));
        let wobble = 0.01 * (frame as f32).sin();
        let updates = [
            format!(
                r#"{{"topic":"position","value":[{},{},0.0],"ts_us":{}}}"#,
                1.85 + wobble,
                4.42 - wobble,
                captured.as_micros()
            ),
            format!(r#"{{"topic":"rotation","value":[0.0,0.0,0.0],"ts_us":{}}}"#, captured.as_micros()),
        ];
        for update in updates {
            if let Err(e) = bus.apply_json(update.as_bytes(), Instant::now()) {
                warn!(error = %e, "Vision update rejected");
            }
        }
    }
}

/// Fixed-rate robot loop: autonomous first, then teleop.
async fn run_robot(
    mut container: RobotContainer<SimPin>,
    limit: Option<u64>,
    auto_ticks: u64,
) {
    let mut ticker = Ticker::every(TICK);
    let mut tick: u64 = 0;
    info!(outcome = ?container.autonomous_init(Instant::now()), "Autonomous enabled");
    loop {
        ticker.next().await;
        container.tick(Instant::now());
        tick += 1;

        if tick == auto_ticks {
            info!("Teleop enabled");
            container.teleop_init();
        }
        if tick % 50 == 0 {
            let robot = container.robot();
            info!(tick, pose = ?robot.drive.pose(), mode = ?robot.mode(), "Status");
        }
        if limit.is_some_and(|l| tick >= l) {
            info!(tick, outcome = ?container.stop(Instant::now()), "Tick limit reached, stopping");
            container.tick(Instant::now());
            info!(pose = ?container.robot().drive.pose(), "Final pose");
            std::process::exit(0);
        }
    }
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner) {
    let opts: Opts = Opts::parse();
    let config = match load_config(&opts) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let bus = Arc::new(TopicBus::new());
    let container = match RobotContainer::new(hardware(), bus.clone(), &config) {
        Ok(container) => container,
        Err(e) => {
            error!(error = %e, "Robot setup failed");
            std::process::exit(1);
        }
    };

    let auto_ticks = (opts.auto_secs.max(0.0) * 1000.0 / TICK.as_millis() as f32) as u64;
    spawner.spawn(vision_task(bus)).unwrap();
    run_robot(container, opts.ticks, auto_ticks).await;
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let executor = mk_static!(Executor, Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner)).unwrap();
    });
}
