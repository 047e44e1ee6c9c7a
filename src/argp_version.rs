//! Extends `argp` with a `--version`/`-V` switch that early-exits, so the
//! top-level args type does not have to carry it.
use std::ffi::OsStr;

use argp::{parser::ParseGlobalOptions, EarlyExit, FromArgs, TopLevelCommand};

struct WithVersion<T>(T)
where T: FromArgs;

impl<T> TopLevelCommand for WithVersion<T> where T: FromArgs {}

impl<T> FromArgs for WithVersion<T>
where T: FromArgs
{
    fn _from_args(
        command_name: &[&str],
        args: &[&OsStr],
        parent: Option<&mut dyn ParseGlobalOptions>,
    ) -> Result<Self, EarlyExit> {
        #[derive(FromArgs)]
        /// Print version information and exit.
        struct Version {
            /// Print version information and exit.
            #[argp(switch, short = 'V')]
            version: bool,
        }

        match Version::from_args(command_name, args) {
            Ok(v) if v.version => {
                println!(
                    "{} {}",
                    command_name.first().unwrap_or(&""),
                    env!("CARGO_PKG_VERSION")
                );
                std::process::exit(0);
            }
            // No --version switch present: hand the arguments through.
            Ok(_) | Err(EarlyExit::Err(_)) => T::_from_args(command_name, args, parent).map(Self),
            Err(EarlyExit::Help(_)) => T::from_args(command_name, &["--help"]).map(Self),
        }
    }
}

/// Parses the process arguments, exiting early on `--help` or `--version`.
pub fn from_env<T>() -> T
where T: TopLevelCommand {
    argp::parse_args_or_exit::<WithVersion<T>>(argp::DEFAULT).0
}
