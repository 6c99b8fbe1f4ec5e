use std::path::PathBuf;

/// Communicate with CDS55xx serial bus servos.
///
/// Most commands that take a servo ID also accept the special value
/// "broadcast". The only exceptions are the commands that read back data,
/// which can not be broadcasted.
#[derive(clap::Parser)]
pub struct Options {
	/// Print more verbose messages. Can be used multiple times.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// The serial port to use.
	#[clap(long, short)]
	#[clap(global = true)]
	#[cfg_attr(target_os = "windows", clap(default_value = "COM1"))]
	#[cfg_attr(not(target_os = "windows"), clap(default_value = "/dev/ttyUSB0"))]
	pub serial_port: PathBuf,

	/// The baud rate for the serial port.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(default_value = "1000000")]
	pub baud_rate: u32,

	/// The reply timeout for a single command, in milliseconds.
	#[clap(long)]
	#[clap(global = true)]
	#[clap(default_value = "500")]
	pub timeout_ms: u32,

	#[clap(subcommand)]
	pub command: Command,
}

#[derive(clap::Parser)]
pub enum Command {
	/// Ping a servo.
	Ping {
		/// The servo to ping (no broadcast ID allowed, use `scan`).
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,
	},

	/// Sweep identifiers and baud rates for connected servos.
	Scan {
		/// The baud rates to try, comma separated.
		#[clap(long, value_delimiter = ',')]
		#[clap(default_value = "1000000,500000,250000,115200,57600,19200")]
		baud_rates: Vec<u32>,

		/// Report any activity instead of verified ping replies only.
		#[clap(long)]
		no_verify: bool,
	},

	/// Reset a servo to its factory defaults.
	Reset {
		/// The servo to reset.
		///
		/// You may specify the broadcast address to reset all connected servos.
		#[clap(value_name = "SERVO_ID|broadcast")]
		servo_id: ServoId,
	},

	/// Read an 8-bit register from a servo.
	Read8 {
		/// The servo to read from (no broadcast ID allowed).
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The register address to read from.
		#[clap(value_name = "ADDRESS")]
		address: u8,
	},

	/// Read a 16-bit register from a servo.
	Read16 {
		/// The servo to read from (no broadcast ID allowed).
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The register address to read from.
		#[clap(value_name = "ADDRESS")]
		address: u8,
	},

	/// Write an 8-bit value to a servo register.
	Write8 {
		/// The servo to write to.
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The register address to write to.
		#[clap(value_name = "ADDRESS")]
		address: u8,

		/// The value to write.
		#[clap(value_name = "VALUE")]
		value: u8,
	},

	/// Write a 16-bit value to a servo register.
	Write16 {
		/// The servo to write to.
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The register address to write to.
		#[clap(value_name = "ADDRESS")]
		address: u8,

		/// The value to write.
		#[clap(value_name = "VALUE")]
		value: u16,
	},

	/// Move a servo to an angle, optionally at a given speed.
	Move {
		/// The servo to move.
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The target angle in degrees, 0 to 300.
		#[clap(value_name = "DEGREES")]
		degrees: f32,

		/// The speed in RPM, 0 to 62. Omitted: the configured speed.
		#[clap(long)]
		rpm: Option<f32>,
	},

	/// Switch a servo between wheel mode and servo mode.
	WheelMode {
		/// The servo to switch.
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// Whether wheel mode should be on or off.
		#[clap(value_name = "on|off")]
		state: Switch,
	},

	/// Set the wheel mode speed of a servo.
	WheelSpeed {
		/// The servo to drive.
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The speed in RPM, -62 to 62. Negative is counter-clockwise.
		#[clap(value_name = "RPM")]
		#[clap(allow_hyphen_values = true)]
		rpm: f32,
	},

	/// Enable or disable the output torque of a servo.
	Torque {
		/// The servo to change.
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// Whether the torque should be on or off.
		#[clap(value_name = "on|off")]
		state: Switch,
	},

	/// Read and decode the live telemetry block of a servo.
	Status {
		/// The servo to query (no broadcast ID allowed).
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,
	},

	/// Replace the firmware of a servo.
	Upgrade {
		/// The servo to reflash (no broadcast ID allowed).
		#[clap(value_name = "SERVO_ID")]
		servo_id: ServoId,

		/// The firmware image to flash.
		#[clap(value_name = "FILE")]
		file: PathBuf,

		/// How many times to retry the whole session.
		#[clap(long, default_value = "10")]
		total_retry: u32,
	},

	/// Write shell completions to standard output or a file.
	ShellCompletion {
		/// The shell for which to generate completions.
		#[clap(long)]
		shell: clap_complete::Shell,

		/// The file to write the generated completion file to.
		#[clap(long, short)]
		output: Option<PathBuf>,
	},
}

#[derive(Copy, Clone)]
pub enum ServoId {
	Id(u8),
	Broadcast,
}

impl ServoId {
	pub fn raw(self) -> u8 {
		match self {
			Self::Id(raw) => raw,
			Self::Broadcast => cds55xx::BROADCAST_ID,
		}
	}

	pub fn assume_unicast(self) -> Result<u8, ()> {
		match self {
			Self::Id(raw) => Ok(raw),
			Self::Broadcast => {
				log::error!("Invalid servo ID: this command can not be broadcasted.");
				Err(())
			},
		}
	}
}

impl std::str::FromStr for ServoId {
	type Err = &'static str;

	fn from_str(data: &str) -> Result<Self, Self::Err> {
		if data.eq_ignore_ascii_case("broadcast") {
			Ok(Self::Broadcast)
		} else if let Ok(id) = data.parse() {
			if id == cds55xx::BROADCAST_ID {
				Ok(Self::Broadcast)
			} else if id <= cds55xx::MAX_UNICAST_ID {
				Ok(Self::Id(id))
			} else {
				Err("invalid servo ID: expected a number in the range 0..253 or the special value \"broadcast\"")
			}
		} else {
			Err("invalid servo ID: expected a number in the range 0..253 or the special value \"broadcast\"")
		}
	}
}

#[derive(Copy, Clone, clap::ValueEnum)]
pub enum Switch {
	On,
	Off,
}

impl Switch {
	pub fn is_on(self) -> bool {
		matches!(self, Self::On)
	}
}
