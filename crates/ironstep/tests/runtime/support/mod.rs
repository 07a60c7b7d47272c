pub mod activities;
pub mod helpers;
pub mod schemes;
