//! Charging strategies, one per tariff design.
//!
//! - Uncontrolled: full power from arrival, no solve
//! - Volumetric: one LP per session against a per-timestep grid rate
//! - Joint: one LP per station (tiers, subscription, monthly peaks)
//!
//! The rolling flat capacity strategy lives in `controller::rolling`.

pub mod joint;
pub mod uncontrolled;
pub mod volumetric;

pub use joint::*;
pub use uncontrolled::*;
pub use volumetric::*;

use super::model::SolvedModel;
use super::SchedulingContext;
use crate::domain::{Entity, ScheduleAccumulator, SessionSet, StationId};

/// Copy the solved station total and, if requested, the per-session powers
/// of every step in the model horizon into `acc`.
pub(crate) fn record_solution(
    acc: &mut ScheduleAccumulator,
    solved: &SolvedModel,
    station: &StationId,
    sessions: &SessionSet,
    ctx: &SchedulingContext,
) {
    let station_col = Entity::Station(station.clone());
    acc.ensure(station_col.clone());
    for step in solved.model().horizon() {
        acc.add(step, station_col.clone(), solved.total_power(step));
    }

    if ctx.include_session_columns {
        for vars in solved.model().sessions() {
            let column = Entity::Session(vars.session.clone());
            for step in vars.steps() {
                acc.record(step, column.clone(), solved.session_power(&vars.session, step));
            }
        }
        for session in sessions {
            acc.ensure(Entity::Session(session.id.clone()));
        }
    }
}
