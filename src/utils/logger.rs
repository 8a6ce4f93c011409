//! Logger setup
//!
//! Installs a `fern` dispatch behind the `log` facade. Debug and trace lines
//! carry their target module, higher levels only the message.

use chrono::Local;
use log::LevelFilter;

use crate::common::MpcResult;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Install the global logger writing to stdout.
///
/// May only be called once per process; later calls return
/// `MpcError::Logger`.
pub fn init(level: LevelFilter) -> MpcResult<()> {
    dispatch(level).chain(std::io::stdout()).apply()?;
    Ok(())
}

/// Same as `init`, but writes to stderr so stdout stays free for frames
pub fn init_stderr(level: LevelFilter) -> MpcResult<()> {
    dispatch(level).chain(std::io::stderr()).apply()?;
    Ok(())
}

fn dispatch(level: LevelFilter) -> fern::Dispatch {
    fern::Dispatch::new()
        .format(|out, message, record| {
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{} {:5}] {}: {}",
                    Local::now().format(TIMESTAMP_FORMAT),
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{} {:5}] {}",
                    Local::now().format(TIMESTAMP_FORMAT),
                    record.level(),
                    message
                ))
            }
        })
        .level(level)
}
