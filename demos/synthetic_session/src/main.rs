use argh::FromArgs;
use std::path::PathBuf;

use glam::DVec3;
use xrpose::{
    Clock, DeviceIntegration, IntegrationConfig, ManualClock, ReplaySource, SyntheticNoise,
    SyntheticRig,
};
use xrpose_calib::Side;
use xrpose_lie::{delta_error, pose_to_transform, SE3, SO3};

#[derive(FromArgs)]
/// Calibrate simulated lighthouse trackers against simulated wrist poses
struct Args {
    /// path to a JSON integration config
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of frames to simulate
    #[argh(option, default = "300")]
    frames: usize,

    /// frame rate in Hz
    #[argh(option, default = "90.0")]
    rate: f64,

    /// seed of the simulated noise
    #[argh(option, default = "0")]
    seed: u64,

    /// tracker translation noise in millimeters
    #[argh(option, default = "1.0")]
    noise_mm: f64,

    /// tracker rotation noise in degrees
    #[argh(option, default = "0.1")]
    noise_deg: f64,

    /// probability of a gross outlier per tracker sample
    #[argh(option, default = "0.05")]
    outliers: f64,

    /// mount the trackers on the opposite wrists
    #[argh(switch)]
    swap: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => IntegrationConfig::from_json_file(path)?,
        None => IntegrationConfig::default(),
    };
    log::info!("schedule: {:?}", config.schedule);

    let scene_t_lighthouse = SE3::new(
        SO3::from_axis_angle(DVec3::Y, 1.2),
        DVec3::new(2.0, -0.5, 1.0),
    );
    let mut rig = SyntheticRig::new(scene_t_lighthouse, args.seed).with_noise(SyntheticNoise {
        translation_m: args.noise_mm * 1e-3,
        rotation_rad: args.noise_deg.to_radians(),
        outlier_probability: args.outliers,
    });
    if args.swap {
        rig = rig.with_tracker_ids("WM1", "WM0");
    }

    let orientation = config.calibration.orientation;
    let tracker_correction = pose_to_transform(&config.retarget.tracker_correction, orientation)?;
    let mut integration = DeviceIntegration::new(config)?;
    let mut trackers = ReplaySource::new();
    let mut gloves = ReplaySource::new();
    let clock = ManualClock::new(0.0);
    let frame_secs = 1.0 / args.rate;

    let mut calibrated_at = None;
    for k in 0..args.frames {
        let frame = rig.frame(clock.now());
        trackers.push(frame.trackers);
        gloves.push(frame.gloves);
        integration.tick(&mut trackers, &mut gloves, &frame.references, &clock);

        if calibrated_at.is_none() && integration.calibration().is_some() {
            calibrated_at = Some(k);
            println!("calibrated after {} frames ({:.3} s)", k + 1, clock.now());
        }

        if calibrated_at.is_some() && k + 1 == args.frames {
            let scene = integration.scene_poses();
            for side in Side::BOTH {
                let Some(pose) = scene.per_device.get(rig.tracker_id(side)) else {
                    continue;
                };
                let expected = *frame.truth.wrist(side) * tracker_correction;
                let err = delta_error(&pose_to_transform(pose, orientation)?, &expected);
                println!(
                    "{side} wrist error: {:.2} mm, {:.3} deg",
                    err.translation_m * 1e3,
                    err.rotation_deg
                );
            }
        }

        clock.advance(frame_secs);
    }

    let Some(calibration) = integration.calibration() else {
        println!("no calibration after {} frames", args.frames);
        return Ok(());
    };

    let err = delta_error(&calibration.scene_t_lighthouse, rig.scene_t_lighthouse());
    println!(
        "left tracker: {}, right tracker: {}",
        calibration.left_device_id.as_deref().unwrap_or("-"),
        calibration.right_device_id.as_deref().unwrap_or("-"),
    );
    println!(
        "scene_T_lighthouse error: {:.2} mm, {:.3} deg",
        err.translation_m * 1e3,
        err.rotation_deg
    );
    println!("status: {:?}", integration.status());

    Ok(())
}
