pub mod observe_on;
mod scheduled_scalar;
