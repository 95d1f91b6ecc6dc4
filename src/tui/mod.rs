mod app;
mod ui;

use crate::controller::Controller;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

pub use app::App;

/// Run the operator console until the operator quits or `max_duration` passes
pub fn run(controller: Arc<Controller>, max_duration: Option<Duration>) -> Result<()> {
    let mut app = App::new(controller, max_duration);
    app.run()
}
