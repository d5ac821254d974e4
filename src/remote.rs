use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gotham::handler::HandlerError;
use gotham::helpers::http::response::create_response;
use gotham::hyper::{body, Body, Response, StatusCode};
use gotham::middleware::state::StateMiddleware;
use gotham::pipeline::{new_pipeline, single_pipeline};
use gotham::prelude::*;
use gotham::router::{build_router, Router};
use gotham::state::State;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::DriveConfig;
use crate::error::{Error, Result};
use crate::light::{Light, LightOutput};
use crate::motor::{AxisMapping, Drivable};
use crate::stream::{video_image, VideoFeed};
use crate::turret::{Launcher, Transport, TurretCommand};

pub const SUCCESS: &str = "Success!";

pub const ROVER_PAGE_HTML: &str = include_str!("../static/rover.html");
pub const LAUNCHER_PAGE_HTML: &str = include_str!("../static/launcher.html");

fn lock<T>(inner: &Mutex<T>) -> MutexGuard<'_, T> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rover actuators shared by the request handlers.
#[derive(StateData)]
pub struct RoverControl<D: Drivable, L: LightOutput> {
    car: Arc<Mutex<D>>,
    light: Arc<Mutex<Light<L>>>,
    mapping: AxisMapping,
    left_axis: usize,
    right_axis: usize,
    light_button: usize,
}

impl<D: Drivable, L: LightOutput> Clone for RoverControl<D, L> {
    fn clone(&self) -> Self {
        Self {
            car: self.car.clone(),
            light: self.light.clone(),
            mapping: self.mapping,
            left_axis: self.left_axis,
            right_axis: self.right_axis,
            light_button: self.light_button,
        }
    }
}

impl<D: Drivable, L: LightOutput> RoverControl<D, L> {
    pub fn new(car: D, light: Light<L>, config: &DriveConfig) -> Self {
        RoverControl {
            car: Arc::new(Mutex::new(car)),
            light: Arc::new(Mutex::new(light)),
            mapping: AxisMapping::from(config),
            left_axis: config.left_axis,
            right_axis: config.right_axis,
            light_button: config.light_button,
        }
    }

    pub fn car(&self) -> MutexGuard<D> {
        lock(&self.car)
    }

    pub fn light(&self) -> MutexGuard<Light<L>> {
        lock(&self.light)
    }

    /// Maps gamepad axes onto the motors.
    pub fn drive(&self, axes: &[f64]) -> Result<(f64, f64)> {
        let needed = self.left_axis.max(self.right_axis) + 1;
        if axes.len() < needed {
            return Err(Error::Payload(format!(
                "expected {needed} axis values, got {}",
                axes.len()
            )));
        }
        let left = self.mapping.map(axes[self.left_axis]);
        let right = self.mapping.map(axes[self.right_axis]);
        let mut car = self.car();
        car.set_left(left)?;
        car.set_right(right)?;
        Ok((left, right))
    }

    /// Toggles the light when the light button is held. Returns whether it did.
    pub fn buttons(&self, buttons: &[bool]) -> Result<bool> {
        match buttons.get(self.light_button) {
            None => Err(Error::Payload(format!(
                "expected {} button values, got {}",
                self.light_button + 1,
                buttons.len()
            ))),
            Some(false) => Ok(false),
            Some(true) => {
                self.light().toggle()?;
                Ok(true)
            }
        }
    }
}

/// Launcher turret shared by the request handlers.
#[derive(StateData)]
pub struct LauncherControl<T: Transport> {
    launcher: Arc<Launcher<T>>,
    hold: Duration,
}

impl<T: Transport> Clone for LauncherControl<T> {
    fn clone(&self) -> Self {
        Self {
            launcher: self.launcher.clone(),
            hold: self.hold,
        }
    }
}

impl<T: Transport> LauncherControl<T> {
    pub fn new(launcher: Launcher<T>, hold: Duration) -> Self {
        LauncherControl {
            launcher: Arc::new(launcher),
            hold,
        }
    }

    pub fn launcher(&self) -> &Launcher<T> {
        &self.launcher
    }
}

/// Landing page written to a temporary file for the router to serve.
/// The file is removed when this is dropped.
pub struct LandingPage {
    file: NamedTempFile,
}

impl LandingPage {
    pub fn write(html: &str) -> Result<Self> {
        let file = tempfile::Builder::new().suffix(".html").tempfile()?;
        std::fs::write(file.path(), html)?;
        Ok(LandingPage { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn success(state: &State) -> Response<Body> {
    create_response(state, StatusCode::OK, mime::TEXT_PLAIN, SUCCESS)
}

fn bad_request(err: Error) -> HandlerError {
    HandlerError::from(err).with_status(StatusCode::BAD_REQUEST)
}

/// Values of the repeated `data[]` field in a urlencoded form.
pub fn form_values(form: &[u8]) -> Vec<String> {
    url::form_urlencoded::parse(form)
        .filter(|(key, _)| key == "data[]")
        .map(|(_, value)| value.into_owned())
        .collect()
}

pub fn parse_axes(values: &[String]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|value| {
            match value.trim().parse::<f64>() {
                Ok(axis) if axis.is_finite() => Ok(axis),
                _ => Err(Error::Payload(format!("axis value {value:?} is not a number"))),
            }
        })
        .collect()
}

pub fn parse_buttons(values: &[String]) -> Vec<bool> {
    values.iter().map(|value| value == "true").collect()
}

async fn read_form(state: &mut State) -> std::result::Result<Vec<String>, HandlerError> {
    let form = body::to_bytes(Body::take_from(state)).await?;
    Ok(form_values(&form))
}

pub async fn set_axis_values<D: Drivable, L: LightOutput>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    let values = read_form(state).await?;
    let axes = parse_axes(&values).map_err(bad_request)?;
    let (left, right) = match RoverControl::<D, L>::borrow_from(state).drive(&axes) {
        Err(err @ Error::Payload(_)) => return Err(bad_request(err)),
        result => result?,
    };
    debug!(left, right, "motors set");
    Ok(success(state))
}

pub async fn set_button_values<D: Drivable, L: LightOutput>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    let values = read_form(state).await?;
    let buttons = parse_buttons(&values);
    match RoverControl::<D, L>::borrow_from(state).buttons(&buttons) {
        Err(err @ Error::Payload(_)) => return Err(bad_request(err)),
        Err(err) => return Err(err.into()),
        Ok(true) => debug!("light toggled from gamepad"),
        Ok(false) => {}
    }
    Ok(success(state))
}

pub async fn stop<D: Drivable, L: LightOutput>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    RoverControl::<D, L>::borrow_from(state).car().stop()?;
    debug!("motors stopped");
    Ok(success(state))
}

pub async fn light<D: Drivable, L: LightOutput>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    let on = RoverControl::<D, L>::borrow_from(state).light().toggle()?;
    debug!(on, "light toggled");
    Ok(success(state))
}

pub fn rover_status<D: Drivable, L: LightOutput>(state: State) -> (State, Response<Body>) {
    let status = {
        let car = RoverControl::<D, L>::borrow_from(&state).car();
        serde_json::json!({
            "left motor": car.left(),
            "right motor": car.right(),
        })
    };
    let response = create_response(
        &state,
        StatusCode::OK,
        mime::APPLICATION_JSON,
        status.to_string(),
    );
    (state, response)
}

/// Runs a turret command on the blocking pool. Pulses complete when the
/// turret has stopped.
async fn run_turret<T: Transport>(
    control: LauncherControl<T>,
    command: TurretCommand,
) -> std::result::Result<(), HandlerError> {
    tokio::task::spawn_blocking(move || match command {
        TurretCommand::Fire => control.launcher().fire(),
        direction => control.launcher().pulse(direction, control.hold),
    })
    .await??;
    Ok(())
}

pub async fn left<T: Transport>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    let control = LauncherControl::<T>::borrow_from(state).clone();
    run_turret(control, TurretCommand::Left).await?;
    Ok(success(state))
}

pub async fn right<T: Transport>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    let control = LauncherControl::<T>::borrow_from(state).clone();
    run_turret(control, TurretCommand::Right).await?;
    Ok(success(state))
}

pub async fn fire<T: Transport>(
    state: &mut State,
) -> std::result::Result<Response<Body>, HandlerError> {
    let control = LauncherControl::<T>::borrow_from(state).clone();
    run_turret(control, TurretCommand::Fire).await?;
    debug!("fired");
    Ok(success(state))
}

pub fn launcher_status(state: State) -> (State, Response<Body>) {
    let response = create_response(&state, StatusCode::OK, mime::APPLICATION_JSON, "{}");
    (state, response)
}

pub fn rover_router<D: Drivable, L: LightOutput>(
    feed: VideoFeed,
    control: RoverControl<D, L>,
    page: &LandingPage,
) -> Router {
    let (chain, pipelines) = single_pipeline(
        new_pipeline()
            .add(StateMiddleware::new(feed))
            .add(StateMiddleware::new(control))
            .build(),
    );
    build_router(chain, pipelines, |route| {
        route.get("/").to_file(page.path());
        route.get("/video_image").to(video_image);
        route
            .post("/set_axis_values")
            .to_async_borrowing(set_axis_values::<D, L>);
        route
            .post("/set_button_values")
            .to_async_borrowing(set_button_values::<D, L>);
        route.post("/stop").to_async_borrowing(stop::<D, L>);
        route.post("/light").to_async_borrowing(light::<D, L>);
        route.get("/status").to(rover_status::<D, L>);
    })
}

pub fn launcher_router<T: Transport>(
    feed: VideoFeed,
    control: LauncherControl<T>,
    page: &LandingPage,
) -> Router {
    let (chain, pipelines) = single_pipeline(
        new_pipeline()
            .add(StateMiddleware::new(feed))
            .add(StateMiddleware::new(control))
            .build(),
    );
    build_router(chain, pipelines, |route| {
        route.get("/").to_file(page.path());
        route.get("/video_image").to(video_image);
        route.post("/left").to_async_borrowing(left::<T>);
        route.post("/right").to_async_borrowing(right::<T>);
        route.post("/fire").to_async_borrowing(fire::<T>);
        route.get("/status").to(launcher_status);
    })
}

/// Serves `router` until the process exits.
pub fn serve(addr: &str, router: Router) -> Result<()> {
    info!("Listening on http://{addr}");
    gotham::start(addr.to_owned(), router).map_err(|err| Error::Server(err.to_string()))
}
