use std::path::Path;
use std::time::Duration;

use clap::Parser;

use cds55xx::firmware::FirmwareConfig;
use cds55xx::protocol::RamField;
use cds55xx::transport::{SerialSettings, SerialTransport, Timeout};
use cds55xx::{units, Bus, Scanner, ScannerConfig, ServoProtocol, StatusPacket};

mod logging;
mod options;

use options::{Command, Options, ServoId};

fn main() {
	let options = Options::parse();
	logging::init(env!("CARGO_CRATE_NAME"), options.verbose);
	if let Err(()) = do_main(options) {
		std::process::exit(1);
	}
}

fn do_main(options: Options) -> Result<(), ()> {
	let timeout = Duration::from_millis(u64::from(options.timeout_ms));
	match &options.command {
		Command::Ping { servo_id } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			log::debug!("Sending ping command to servo {}", servo.id());
			let response = bus
				.send_and_wait(&servo.ping(), timeout)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			log_response(&response);
		},
		Command::Scan { baud_rates, no_verify } => {
			let mut config = ScannerConfig::new(&options.serial_port, baud_rates.clone());
			config.verify = !no_verify;
			config.search_timeout = timeout;
			log::debug!("Scanning {} baud rates on {}", baud_rates.len(), options.serial_port.display());
			let mut scanner = Scanner::new(config);
			scanner.start(|baud_rate, id, faults| {
				log::info!("Found servo {} at {} baud ({})", id, baud_rate, faults);
			});
			while scanner.is_scanning() {
				std::thread::sleep(Duration::from_millis(100));
			}
		},
		Command::Reset { servo_id } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			log::debug!("Sending reset command to servo {}", servo.id());
			transfer(&bus, &servo.reset(), *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::Read8 { servo_id, address } => {
			let bus = open_bus(&options)?;
			let servo = unicast(*servo_id)?;
			log::debug!("Reading an 8-bit value from servo {} at address {}", servo.id(), address);
			let response = bus
				.send_and_wait(&servo.read(*address, 1), timeout)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			report_faults(&response);
			match response.parameters() {
				&[value] => log::info!("Ok: {} (0x{:02X})", value, value),
				parameters => {
					log::error!("Unexpected response payload: {:02X?}", parameters);
					return Err(());
				},
			}
		},
		Command::Read16 { servo_id, address } => {
			let bus = open_bus(&options)?;
			let servo = unicast(*servo_id)?;
			log::debug!("Reading a 16-bit value from servo {} at address {}", servo.id(), address);
			let response = bus
				.send_and_wait(&servo.read(*address, 2), timeout)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			report_faults(&response);
			match response.parameters() {
				&[low, high] => {
					let value = units::word_to_int(low, high);
					log::info!("Ok: {} (0x{:04X})", value, value);
				},
				parameters => {
					log::error!("Unexpected response payload: {:02X?}", parameters);
					return Err(());
				},
			}
		},
		Command::Write8 { servo_id, address, value } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			log::debug!(
				"Writing 8-bit value {} (0x{:02X}) to servo {} at address {}",
				value,
				value,
				servo.id(),
				address
			);
			transfer(&bus, &servo.write(*address, &[*value]), *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::Write16 { servo_id, address, value } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			log::debug!(
				"Writing 16-bit value {} (0x{:04X}) to servo {} at address {}",
				value,
				value,
				servo.id(),
				address
			);
			let data = [(value & 0xFF) as u8, (value >> 8) as u8];
			transfer(&bus, &servo.write(*address, &data), *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::Move { servo_id, degrees, rpm } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			let packet = match rpm {
				Some(rpm) => {
					log::debug!("Moving servo {} to {} degrees at {} RPM", servo.id(), degrees, rpm);
					servo.ram().move_to_with_speed_rpm(*degrees, *rpm)
				},
				None => {
					log::debug!("Moving servo {} to {} degrees", servo.id(), degrees);
					servo.ram().move_to(*degrees)
				},
			}
			.map_err(|e| log::error!("Command failed: {}", e))?;
			transfer(&bus, &packet, *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::WheelMode { servo_id, state } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			let packet = if state.is_on() {
				log::debug!("Putting servo {} in wheel mode", servo.id());
				servo.motor().wheel_mode()
			} else {
				log::debug!("Putting servo {} back in servo mode", servo.id());
				servo.motor().servo_mode()
			};
			transfer(&bus, &packet, *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::WheelSpeed { servo_id, rpm } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			log::debug!("Setting wheel speed of servo {} to {} RPM", servo.id(), rpm);
			let packet = servo
				.motor()
				.set_speed_rpm(*rpm)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			transfer(&bus, &packet, *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::Torque { servo_id, state } => {
			let bus = open_bus(&options)?;
			let servo = servo(*servo_id)?;
			log::debug!("Turning torque of servo {} {}", servo.id(), if state.is_on() { "on" } else { "off" });
			transfer(&bus, &servo.ram().set_torque_enable(state.is_on()), *servo_id, timeout)?;
			log::info!("Ok");
		},
		Command::Status { servo_id } => {
			let bus = open_bus(&options)?;
			let servo = unicast(*servo_id)?;
			log::debug!("Reading the telemetry block of servo {}", servo.id());
			let response = bus
				.send_and_wait(&servo.ram().read_block(RamField::PresentPosition, 8), timeout)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			report_faults(&response);
			for (field, value) in cds55xx::parse_ram_block(response.parameters(), RamField::PresentPosition) {
				match field {
					RamField::PresentPosition => {
						log::info!("Position: {:.1} degrees", units::register_to_degrees(value))
					},
					RamField::PresentSpeed => log::info!("Speed: {:.1} RPM", units::register_to_rpm(value)),
					RamField::PresentLoad => log::info!("Load: {}", value),
					RamField::PresentVoltage => {
						log::info!("Voltage: {:.1} V", units::register_to_volts(value as u8))
					},
					RamField::Temperature => log::info!("Temperature: {} C", value),
					_ => (),
				}
			}
		},
		Command::Upgrade { servo_id, file, total_retry } => {
			let servo_id = servo_id.assume_unicast()?;
			let mut config = FirmwareConfig::new(&options.serial_port, options.baud_rate, servo_id);
			config.total_retry = *total_retry;
			log::info!("Flashing {} to servo {}", file.display(), servo_id);
			let ok = cds55xx::firmware::upgrade_file(&config, file)
				.map_err(|e| log::error!("Failed to read {}: {}", file.display(), e))?;
			if ok {
				log::info!("Ok");
			} else {
				log::error!("Firmware update failed");
				return Err(());
			}
		},
		Command::ShellCompletion { shell, output } => {
			write_shell_completion(*shell, output.as_deref())?;
		},
	}

	Ok(())
}

fn servo(servo_id: ServoId) -> Result<ServoProtocol, ()> {
	ServoProtocol::new(servo_id.raw()).map_err(|e| log::error!("Invalid servo ID: {}", e))
}

fn unicast(servo_id: ServoId) -> Result<ServoProtocol, ()> {
	servo(ServoId::Id(servo_id.assume_unicast()?))
}

fn open_bus(options: &Options) -> Result<Bus<SerialTransport>, ()> {
	let mut settings = SerialSettings::new(options.baud_rate);
	settings.timeout = Timeout::simple(options.timeout_ms);
	let transport = SerialTransport::open(&options.serial_port, &settings)
		.map_err(|e| log::error!("Failed to open serial port: {}: {}", options.serial_port.display(), e))?;
	log::debug!(
		"Using serial port {} with baud rate {}",
		options.serial_port.display(),
		options.baud_rate
	);
	Ok(Bus::new(transport))
}

/// Send a command, waiting for the reply unless it was broadcast.
fn transfer(bus: &Bus<SerialTransport>, packet: &[u8], servo_id: ServoId, timeout: Duration) -> Result<(), ()> {
	match servo_id {
		ServoId::Broadcast => {
			bus.send_no_wait(packet).map_err(|e| log::error!("Command failed: {}", e))?;
		},
		ServoId::Id(_) => {
			let response = bus
				.send_and_wait(packet, timeout)
				.map_err(|e| log::error!("Command failed: {}", e))?;
			report_faults(&response);
		},
	}
	Ok(())
}

fn report_faults(response: &StatusPacket) {
	if !response.error().is_ok() {
		log::warn!("Servo {} reports: {}", response.id(), response.error());
	}
}

fn log_response(response: &StatusPacket) {
	log::info!("Servo ID: {}", response.id());
	log::info!("Status: {}", response.error());
}

fn write_shell_completion(shell: clap_complete::Shell, path: Option<&Path>) -> Result<(), ()> {
	use clap::CommandFactory;
	use std::io::Write;

	let mut buffer = Vec::with_capacity(4 * 1024);
	clap_complete::generate(shell, &mut Options::command(), env!("CARGO_BIN_NAME"), &mut buffer);
	if !buffer.ends_with(b"\n") {
		buffer.push(b'\n');
	}

	let path = path.unwrap_or_else(|| Path::new("-"));
	if path == Path::new("-") {
		log::debug!("Writing shell completion for {} to stdout", shell);
		let stdout = std::io::stdout();
		stdout
			.lock()
			.write_all(&buffer)
			.map_err(|e| log::error!("Failed to write to stdout: {}", e))?;
	} else {
		log::debug!("Writing shell completion for {} to {}", shell, path.display());
		let mut output = std::fs::File::create(path).map_err(|e| log::error!("Failed to create {}: {}", path.display(), e))?;
		output
			.write_all(&buffer)
			.map_err(|e| log::error!("Failed to write to {}: {}", path.display(), e))?;
	}

	Ok(())
}
