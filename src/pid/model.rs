//! Gain-scheduled PID parameters.
//!
//! A [`Pid`] holds an ordered list of [`Schedule`]s. Each schedule pairs a gain set
//! ([`Controller`]) with the operating region it applies to ([`ControllerSchedule`]).
//! The server runs the loop and picks the first schedule whose region contains the
//! current process value, error and control output; [`Pid::active_schedule`] reproduces
//! that choice locally.
//!
//! Every struct rejects unknown fields when deserialized.

use serde::{Deserialize, Serialize};

/// `(low, high)` bounds; `None` on either side means unbounded.
pub type Limits = (Option<f64>, Option<f64>);

/// Inclusive `(low, high)` interval used as a schedule constraint.
pub type Interval = (f64, f64);

/// One tuned operating point of the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Controller {
    /// Constant added to the output
    pub bias: f64,
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Setpoint weighting of the proportional term
    pub beta: f64,
    /// Exponent applied to the error
    pub linearity: f64,
    /// Setpoint span used to normalise the error
    pub setpoint_range: Option<f64>,
    /// Bound on the proportional term
    pub p_limit: Option<f64>,
    /// Bound on the integral term
    pub i_limit: Option<f64>,
    /// Bound on the derivative term
    pub d_limit: Option<f64>,
    /// Maximum output change per update
    pub delta_limit: Option<f64>,
    /// Error band outside which the integral does not accumulate
    pub integral_valid: Option<f64>,
    /// Error band around the setpoint within which the output holds
    pub dead_zone: Option<f64>,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            bias: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            beta: 1.0,
            linearity: 1.0,
            setpoint_range: None,
            p_limit: None,
            i_limit: None,
            d_limit: None,
            delta_limit: None,
            integral_valid: None,
            dead_zone: None,
        }
    }
}

impl Controller {
    /// Apply the fields set in `update`, leaving the rest untouched.
    pub fn change_parameters(&mut self, update: &GainUpdate) {
        update.apply(self);
    }
}

/// Operating region of a schedule. Unset constraints always match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ControllerSchedule {
    /// Process value range
    pub process: Option<Interval>,
    /// Error (setpoint minus process value) range
    pub error: Option<Interval>,
    /// Control output range
    pub control: Option<Interval>,
}

impl ControllerSchedule {
    /// A region without constraints (catch-all)
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Whether every defined constraint holds.
    #[must_use]
    pub fn matches(&self, process: f64, error: f64, control: f64) -> bool {
        let within = |bounds: Option<Interval>, value: f64| {
            bounds.map_or(true, |(low, high)| low <= value && value <= high)
        };
        within(self.process, process) && within(self.error, error) && within(self.control, control)
    }

    /// Whether no constraint is defined
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.process.is_none() && self.error.is_none() && self.control.is_none()
    }
}

/// A gain set and the region it applies to.
///
/// On the wire both halves are flattened into one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScheduleWire", into = "ScheduleWire")]
pub struct Schedule {
    /// Gains
    pub controller: Controller,
    /// Region
    pub constraints: ControllerSchedule,
}

impl Schedule {
    /// Pair a gain set with its region
    #[must_use]
    pub fn new(controller: Controller, constraints: ControllerSchedule) -> Self {
        Self {
            controller,
            constraints,
        }
    }

    /// Apply the fields set in `update` to this schedule's gains.
    pub fn change_parameters(&mut self, update: &GainUpdate) {
        self.controller.change_parameters(update);
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ScheduleWire {
    process: Option<Interval>,
    error: Option<Interval>,
    control: Option<Interval>,
    bias: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    beta: f64,
    linearity: f64,
    setpoint_range: Option<f64>,
    p_limit: Option<f64>,
    i_limit: Option<f64>,
    d_limit: Option<f64>,
    delta_limit: Option<f64>,
    integral_valid: Option<f64>,
    dead_zone: Option<f64>,
}

impl Default for ScheduleWire {
    fn default() -> Self {
        Schedule::default().into()
    }
}

impl From<Schedule> for ScheduleWire {
    fn from(schedule: Schedule) -> Self {
        let Schedule {
            controller: c,
            constraints: r,
        } = schedule;
        Self {
            process: r.process,
            error: r.error,
            control: r.control,
            bias: c.bias,
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            beta: c.beta,
            linearity: c.linearity,
            setpoint_range: c.setpoint_range,
            p_limit: c.p_limit,
            i_limit: c.i_limit,
            d_limit: c.d_limit,
            delta_limit: c.delta_limit,
            integral_valid: c.integral_valid,
            dead_zone: c.dead_zone,
        }
    }
}

impl From<ScheduleWire> for Schedule {
    fn from(w: ScheduleWire) -> Self {
        Self {
            controller: Controller {
                bias: w.bias,
                kp: w.kp,
                ki: w.ki,
                kd: w.kd,
                beta: w.beta,
                linearity: w.linearity,
                setpoint_range: w.setpoint_range,
                p_limit: w.p_limit,
                i_limit: w.i_limit,
                d_limit: w.d_limit,
                delta_limit: w.delta_limit,
                integral_valid: w.integral_valid,
                dead_zone: w.dead_zone,
            },
            constraints: ControllerSchedule {
                process: w.process,
                error: w.error,
                control: w.control,
            },
        }
    }
}

/// Default time between controller updates on the server.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1000;

/// Complete controller configuration as executed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Pid {
    /// Whether the server drives the output
    pub enabled: bool,
    /// Time between updates
    pub update_interval_ms: u64,
    /// Target process value
    pub setpoint: f64,
    /// Accumulated integral; owned by the server once registered
    pub integral_term: f64,
    /// Gain schedules in priority order
    pub schedule: Vec<Schedule>,
    /// Bounds on the controller output
    pub output_limits: Limits,
}

impl Default for Pid {
    fn default() -> Self {
        Self {
            enabled: false,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            setpoint: 0.0,
            integral_term: 0.0,
            schedule: Vec::new(),
            output_limits: (None, None),
        }
    }
}

impl Pid {
    /// A disabled controller targeting `setpoint`, with no schedules.
    #[must_use]
    pub fn new(setpoint: f64) -> Self {
        Self {
            setpoint,
            ..Self::default()
        }
    }

    /// Append a schedule; it has lower priority than every existing one.
    pub fn add_schedule(&mut self, schedule: Schedule) -> &mut Self {
        self.schedule.push(schedule);
        self
    }

    /// Set the output bounds.
    #[must_use]
    pub fn with_output_limits(mut self, low: Option<f64>, high: Option<f64>) -> Self {
        self.output_limits = (low, high);
        self
    }

    /// Index of the first schedule whose region contains the operating point.
    #[must_use]
    pub fn active_schedule_index(&self, process: f64, error: f64, control: f64) -> Option<usize> {
        self.schedule
            .iter()
            .position(|s| s.constraints.matches(process, error, control))
    }

    /// The first schedule whose region contains the operating point, or `None` when the
    /// output should be held this cycle.
    #[must_use]
    pub fn active_schedule(&self, process: f64, error: f64, control: f64) -> Option<&Schedule> {
        self.active_schedule_index(process, error, control)
            .and_then(|i| self.schedule.get(i))
    }
}

/// Optional changes to a gain set. Unset fields are left untouched.
///
/// Limit fields take `Some(None)` to remove a bound.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GainUpdate {
    pub bias: Option<f64>,
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
    pub beta: Option<f64>,
    pub linearity: Option<f64>,
    pub setpoint_range: Option<Option<f64>>,
    pub p_limit: Option<Option<f64>>,
    pub i_limit: Option<Option<f64>>,
    pub d_limit: Option<Option<f64>>,
    pub delta_limit: Option<Option<f64>>,
    pub integral_valid: Option<Option<f64>>,
    pub dead_zone: Option<Option<f64>>,
}

macro_rules! setters {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        $(
            #[allow(missing_docs)]
            #[must_use]
            pub fn $field(mut self, value: $ty) -> Self {
                self.$field = Some(value);
                self
            }
        )+
    };
}

impl GainUpdate {
    /// An update that changes nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    setters!(
        bias: f64,
        kp: f64,
        ki: f64,
        kd: f64,
        beta: f64,
        linearity: f64,
        setpoint_range: Option<f64>,
        p_limit: Option<f64>,
        i_limit: Option<f64>,
        d_limit: Option<f64>,
        delta_limit: Option<f64>,
        integral_valid: Option<f64>,
        dead_zone: Option<f64>,
    );

    /// Whether no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set field into `controller`.
    pub fn apply(&self, controller: &mut Controller) {
        macro_rules! assign {
            ($($field:ident),+) => {
                $(
                    if let Some(value) = self.$field {
                        controller.$field = value;
                    }
                )+
            };
        }
        assign!(
            bias,
            kp,
            ki,
            kd,
            beta,
            linearity,
            setpoint_range,
            p_limit,
            i_limit,
            d_limit,
            delta_limit,
            integral_valid,
            dead_zone
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn two_region_pid() -> Pid {
        let mut pid = Pid::new(500.0);
        pid.add_schedule(Schedule::new(
            Controller {
                kp: -1.0,
                ..Controller::default()
            },
            ControllerSchedule {
                error: Some((-50.0, 50.0)),
                ..ControllerSchedule::default()
            },
        ))
        .add_schedule(Schedule::new(
            Controller {
                kp: -0.1,
                ..Controller::default()
            },
            ControllerSchedule::unconstrained(),
        ));
        pid
    }

    #[test]
    fn defaults() {
        let pid = Pid::new(100.0);
        assert!(!pid.enabled);
        assert_eq!(pid.update_interval_ms, 1000);
        assert_eq!(pid.integral_term, 0.0);
        assert_eq!(pid.output_limits, (None, None));
        assert!(pid.schedule.is_empty());
    }

    #[test]
    fn first_matching_schedule_wins() {
        let pid = two_region_pid();
        assert_eq!(pid.active_schedule_index(0.0, 0.0, 0.0), Some(0));
        assert_eq!(pid.active_schedule_index(0.0, 1000.0, 0.0), Some(1));
        // Bounds are inclusive
        assert_eq!(pid.active_schedule_index(0.0, -50.0, 0.0), Some(0));
    }

    #[test]
    fn no_match_holds_output() {
        let mut pid = Pid::new(1.0);
        pid.add_schedule(Schedule::new(
            Controller::default(),
            ControllerSchedule {
                process: Some((0.0, 1.0)),
                control: Some((0.0, 0.3)),
                error: None,
            },
        ));
        assert!(pid.active_schedule(0.5, 0.0, 0.2).is_some());
        assert!(pid.active_schedule(0.5, 0.0, 0.5).is_none());
    }

    #[test]
    fn schedule_serializes_flat() {
        let pid = two_region_pid().with_output_limits(Some(0.1), Some(1.0));
        let value = serde_json::to_value(&pid).unwrap();
        assert_eq!(value["output_limits"], json!([0.1, 1.0]));
        assert_eq!(value["schedule"][0]["error"], json!([-50.0, 50.0]));
        assert_eq!(value["schedule"][0]["kp"], json!(-1.0));
        assert_eq!(value["schedule"][1]["process"], Value::Null);
        assert_eq!(value["schedule"][1]["dead_zone"], Value::Null);

        let back: Pid = serde_json::from_value(value).unwrap();
        assert_eq!(back, pid);
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = serde_json::from_value::<Pid>(json!({"setpoint": 1.0, "invalid_attribute": 5.0}));
        assert!(err.is_err());
        let err = serde_json::from_value::<Schedule>(json!({"kp": 1.0, "kq": 2.0}));
        assert!(err.is_err());
    }

    #[test]
    fn gain_update_touches_only_set_fields() {
        let mut controller = Controller {
            kp: 10.0,
            kd: 10.0,
            dead_zone: Some(0.5),
            ..Controller::default()
        };
        GainUpdate::new().kp(30.0).dead_zone(None).apply(&mut controller);
        assert_eq!(controller.kp, 30.0);
        assert_eq!(controller.kd, 10.0);
        assert_eq!(controller.dead_zone, None);
        assert!(GainUpdate::new().is_empty());
    }
}
