use std::{cell::Cell, convert::Infallible, rc::Rc, sync::Arc};

use embassy_time::Instant;
use embedded_hal::digital::{ErrorType, OutputPin};
use swb_core::utils::{
    command::ScheduleOutcome,
    config::RobotConfig,
    connection::TopicBus,
    controllers::{
        elevator::ElevatorLevel,
        gripper::Claw,
        intake::IntakePosition,
        wheels::WheelSpeed,
        Imu, Motor, Resource, ResourceSet, SwerveModule,
    },
    math::{
        geometry::Rotation2d,
        kinematics::{ModulePosition, ModuleState},
        trajectory::Alliance,
    },
    robot::{autos::AutoRoutine, GamePiece, OperatorInput, RobotContainer, RobotHardware},
};

#[derive(Clone, Default)]
struct Pin(Rc<Cell<bool>>);

impl ErrorType for Pin {
    type Error = Infallible;
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

/// Motor whose encoder follows its output, so closed-loop setpoints are reached.
#[derive(Clone, Default)]
struct Actuator {
    output: Rc<Cell<f32>>,
    position: Rc<Cell<f32>>,
    current: Rc<Cell<f32>>,
}

impl Motor for Actuator {
    fn set(
        &mut self,
        output: f32,
    ) {
        self.output.set(output);
        self.position.set(self.position.get() + output * 2.0);
    }

    fn position(&self) -> f32 {
        self.position.get()
    }

    fn current(&self) -> f32 {
        self.current.get()
    }
}

#[derive(Clone, Default)]
struct Module {
    target: Rc<Cell<ModuleState>>,
    distance: Rc<Cell<f32>>,
}

impl SwerveModule for Module {
    fn set_desired_state(
        &mut self,
        state: ModuleState,
    ) {
        self.target.set(state);
    }

    fn position(&self) -> ModulePosition {
        ModulePosition::new(self.distance.get(), self.target.get().angle)
    }

    fn state(&self) -> ModuleState {
        self.target.get()
    }
}

#[derive(Clone, Default)]
struct Gyro(Rc<Cell<Rotation2d>>);

impl Imu for Gyro {
    fn heading(&self) -> Rotation2d {
        self.0.get()
    }

    fn accel_x(&self) -> f32 {
        0.0
    }
}

struct Bench {
    container: RobotContainer<Pin>,
    bus: Arc<TopicBus>,
    modules: [Module; 4],
    wheels: Actuator,
    climb_servo: Actuator,
    climb_motors: Actuator,
    tick: u64,
}

impl Bench {
    fn new(config: &RobotConfig) -> Self {
        let modules: [Module; 4] = Default::default();
        let wheels = Actuator::default();
        let climb_servo = Actuator::default();
        let climb_motors = Actuator::default();
        let hardware = RobotHardware {
            modules: std::array::from_fn(|i| Box::new(modules[i].clone()) as Box<dyn SwerveModule>),
            imu: Box::new(Gyro::default()),
            intake: Box::new(Actuator::default()),
            wheels: Box::new(wheels.clone()),
            elevator: Box::new(Actuator::default()),
            winch: Box::new(Actuator::default()),
            climb_servo: Box::new(climb_servo.clone()),
            climb_motors: Box::new(climb_motors.clone()),
            claw: Pin::default(),
            pivot: Pin::default(),
            indicator: Default::default(),
        };
        let bus = Arc::new(TopicBus::new());
        let container = RobotContainer::new(hardware, bus.clone(), config).unwrap();
        Self {
            container,
            bus,
            modules,
            wheels,
            climb_servo,
            climb_motors,
            tick: 0,
        }
    }

    fn now(&self) -> Instant {
        Instant::from_millis(self.tick * 20)
    }

    fn step(&mut self) {
        self.tick += 1;
        let now = self.now();
        self.container.tick(now);
    }

    fn run(
        &mut self,
        ticks: u64,
    ) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Press for one tick, then release for one tick.
    fn tap(
        &mut self,
        press: impl Fn(&mut OperatorInput),
    ) {
        let mut input = OperatorInput::default();
        press(&mut input);
        self.container.set_input(input);
        self.step();
        self.container.set_input(OperatorInput::default());
        self.step();
    }
}

#[test]
fn mode_changes_only_through_the_switch_commands() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.run(2);
    assert_eq!(bench.container.robot().mode(), GamePiece::Cube);

    bench.tap(|i| i.copilot.back = true);
    bench.run(5);
    let robot = bench.container.robot();
    assert_eq!(robot.mode(), GamePiece::Cone);
    assert_eq!(robot.gripper.claw(), Claw::Closed);
    assert!(!robot.arm.is_extended());

    // already in cone mode: the switch is skipped
    bench.tap(|i| i.copilot.back = true);
    bench.run(5);
    assert_eq!(bench.container.robot().mode(), GamePiece::Cone);

    bench.tap(|i| i.copilot.start = true);
    bench.run(5);
    assert_eq!(bench.container.robot().mode(), GamePiece::Cube);
}

#[test]
fn cube_actions_are_skipped_in_cone_mode() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.tap(|i| i.copilot.back = true);
    bench.run(5);
    assert_eq!(bench.container.robot().mode(), GamePiece::Cone);

    bench.tap(|i| i.pilot.a = true);
    bench.run(3);
    let robot = bench.container.robot();
    assert_eq!(robot.intake.target(), IntakePosition::Retracted);
    assert_ne!(robot.wheels.speed(), WheelSpeed::Intake);

    bench.tap(|i| i.copilot.start = true);
    bench.run(5);
    bench.tap(|i| i.pilot.a = true);
    let robot = bench.container.robot();
    assert_eq!(robot.intake.target(), IntakePosition::Deployed);
    assert_eq!(robot.wheels.speed(), WheelSpeed::Intake);

    bench.wheels.current.set(40.0);
    bench.run(3);
    let robot = bench.container.robot();
    assert!(robot.wheels.has_piece());
    assert_eq!(robot.wheels.speed(), WheelSpeed::Hold);
    assert_eq!(robot.intake.target(), IntakePosition::Retracted);
}

#[test]
fn first_vision_frame_snaps_the_fused_pose() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.run(2);
    let stamp = bench.now();
    bench.bus.publish("position", &[5.0, 2.0, 0.0], stamp);
    bench.bus.publish("rotation", &[0.0, 30.0, 0.0], stamp);
    bench.step();

    let pose = bench.container.robot().drive.pose();
    assert!((pose.x() - 5.0).abs() < 1e-4);
    assert!((pose.y() - 2.0).abs() < 1e-4);
    assert!(pose.rotation.radians().abs() < 1e-4);

    // a repeated frame is not applied again
    bench.bus.publish("position", &[5.0, 2.0, 0.0], bench.now());
    bench.step();
    let again = bench.container.robot().drive.pose();
    assert!((again.x() - pose.x()).abs() < 1e-6);
    assert!((again.y() - pose.y()).abs() < 1e-6);
}

#[test]
fn move_back_auto_places_the_cone_then_drives_out() {
    let mut bench = Bench::new(&RobotConfig::default());
    assert_eq!(bench.container.selected_autonomous(), AutoRoutine::PlaceConeMoveBack);
    let auto = bench.container.get_autonomous_command().unwrap();
    assert_eq!(bench.container.scheduler().name(auto), Some("place_cone_move_back"));

    bench.step();
    bench.container.autonomous_init(bench.now());
    let mut driving_ticks = 0;
    for _ in 0..1000 {
        bench.step();
        if (bench.modules[0].target.get().speed - 1.0).abs() < 1e-4 {
            driving_ticks += 1;
        }
        if !bench.container.scheduler().is_scheduled(auto) {
            break;
        }
    }
    assert!(!bench.container.scheduler().is_scheduled(auto));
    assert!((240..=250).contains(&driving_ticks), "drove for {driving_ticks} ticks");

    let robot = bench.container.robot();
    assert_eq!(robot.gripper.claw(), Claw::Open);
    assert!(robot.arm.is_extended());
    assert_eq!(robot.elevator.target(), ElevatorLevel::Down);

    bench.step();
    let holder = bench.container.scheduler().requiring(Resource::Drivetrain).unwrap();
    assert_eq!(bench.container.scheduler().name(holder), Some("joystick_drive"));
}

#[test]
fn red_alliance_drives_out_the_other_way() {
    let config = RobotConfig::from_json(r#"{"alliance":"red","auto":{"move_back_secs":0.5}}"#).unwrap();
    let mut bench = Bench::new(&config);
    assert_eq!(bench.container.robot().alliance(), Alliance::Red);
    bench.step();
    bench.container.autonomous_init(bench.now());
    let mut reversed = false;
    for _ in 0..600 {
        bench.step();
        let target = bench.modules[0].target.get();
        if (target.speed.abs() - 1.0).abs() < 1e-4 && (target.angle.degrees().abs() - 180.0).abs() < 1e-2 {
            reversed = true;
        }
    }
    assert!(reversed);
}

#[test]
fn teleop_hands_the_drivetrain_back_to_the_joystick() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.step();
    bench.container.autonomous_init(bench.now());
    bench.run(3);
    let auto = bench.container.get_autonomous_command().unwrap();
    assert_eq!(bench.container.scheduler().requiring(Resource::Drivetrain), Some(auto));

    bench.container.teleop_init();
    bench.step();
    let holder = bench.container.scheduler().requiring(Resource::Drivetrain).unwrap();
    assert_eq!(bench.container.scheduler().name(holder), Some("joystick_drive"));
}

#[test]
fn selectable_routines_are_prebuilt() {
    let config = RobotConfig::from_json(r#"{"auto":{"routine":"do_nothing"}}"#).unwrap();
    let mut bench = Bench::new(&config);
    let id = bench.container.get_autonomous_command().unwrap();
    assert_eq!(bench.container.scheduler().name(id), Some("do_nothing"));

    bench.container.select_autonomous(AutoRoutine::ShootCube);
    let id = bench.container.get_autonomous_command().unwrap();
    assert_eq!(bench.container.scheduler().name(id), Some("shoot_cube"));

    bench.step();
    bench.container.autonomous_init(bench.now());
    bench.run(200);
    let robot = bench.container.robot();
    assert_eq!(robot.mode(), GamePiece::Cube);
    assert_eq!(robot.intake.target(), IntakePosition::Launch);
    assert_eq!(robot.wheels.speed(), WheelSpeed::Third);
}

#[test]
fn buddy_climb_releases_then_follows_the_triggers() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.run(2);
    bench.tap(|i| i.pilot.start = true);
    assert!(bench.container.robot().climb.is_active());
    assert_eq!(bench.climb_servo.output.get(), 1.0);

    let mut input = OperatorInput::default();
    input.pilot.left_trigger = 0.3;
    bench.container.set_input(input);
    bench.step();
    assert!((bench.climb_motors.output.get() - 0.3).abs() < 1e-6);

    bench.container.set_input(OperatorInput::default());
    bench.run(760);
    assert_eq!(bench.climb_servo.output.get(), 0.0);
}

#[test]
fn feeder_pickup_only_runs_in_cone_mode() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.run(2);
    bench.tap(|i| i.copilot.left_trigger = 0.8);
    bench.run(5);
    assert_eq!(bench.container.robot().elevator.target(), ElevatorLevel::Down);

    bench.tap(|i| i.copilot.back = true);
    bench.run(5);
    bench.tap(|i| i.copilot.left_trigger = 0.8);
    bench.run(5);
    let robot = bench.container.robot();
    assert_eq!(robot.gripper.claw(), Claw::Open);
    assert_eq!(robot.elevator.target(), ElevatorLevel::Feeder);
}

#[test]
fn balance_and_stop_take_over_the_drivetrain() {
    let mut bench = Bench::new(&RobotConfig::default());
    bench.step();
    bench.container.balance(bench.now());
    bench.step();
    let holder = bench.container.scheduler().requiring(Resource::Drivetrain).unwrap();
    assert_eq!(bench.container.scheduler().name(holder), Some("balance"));
    assert!((bench.modules[0].target.get().speed.abs() - 0.4).abs() < 1e-4);

    assert_eq!(bench.container.stop(bench.now()), ScheduleOutcome::Scheduled);
    bench.run(10);
    let holder = bench.container.scheduler().requiring(Resource::Drivetrain).unwrap();
    assert_eq!(bench.container.scheduler().name(holder), Some("stop"));
    assert_eq!(bench.modules[0].target.get().speed, 0.0);
}

#[test]
fn every_resource_has_an_owning_subsystem() {
    let mut bench = Bench::new(&RobotConfig::default());
    let owned = bench.container.robot_mut().owned_resources();
    assert_eq!(owned, ResourceSet::from_slice(&Resource::ALL));
}
