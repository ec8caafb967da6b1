#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate sha204_swi;
use sha204_swi::*;

use std::process::exit;

use sha204_swi::command::consts::{
	ZONE_CONFIG,
	ZONE_DATA,
	ZONE_OTP,
};
use sha204_swi::command::Response;
use sha204_swi::linux::GpioPin;
use sha204_swi::swi::BitBang;

type Device = Sha204<BitBang<GpioPin>>;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_optional_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<Option<T>>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		Ok(Some(get_param(matches, name)?))
	} else {
		Ok(None)
	}
}

fn parse_zone(zone: &str) -> AResult<u8> {
	Ok(match zone {
		"config" => ZONE_CONFIG,
		"otp" => ZONE_OTP,
		"data" => ZONE_DATA,
		_ => bail!("unknown zone {:?} (expected config, otp or data)", zone),
	})
}

fn parse_address(address: &str) -> AResult<u16> {
	let parsed = if address.starts_with("0x") {
		u16::from_str_radix(&address[2..], 16)
	} else {
		address.parse::<u16>()
	};
	parsed.map_err(|e| format_err!("invalid address {:?}: {}", address, e))
}

fn hex(data: &[u8]) -> String {
	data.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

fn print_response(response: &Response) {
	if response.outcome().session_lost() {
		warn!("Device was woken up again during the command");
	}
	println!("{}", hex(response.data()));
}

fn timing(matches: &clap::ArgMatches) -> AResult<Timing> {
	let mut timing = Timing::default();
	if let Some(unit) = get_optional_param(matches, "bit_unit")? {
		timing.bit_unit_us = unit;
	}
	if let Some(polls) = get_optional_param(matches, "start_polls")? {
		timing.start_pulse_polls = polls;
	}
	if let Some(polls) = get_optional_param(matches, "zero_polls")? {
		timing.zero_pulse_polls = polls;
	}
	Ok(timing)
}

/// wake the device, run `f` and send the device back to sleep
fn with_device<F, R>(matches: &clap::ArgMatches, f: F) -> AResult<R>
where
	F: FnOnce(&mut Device) -> AResult<R>,
{
	let gpio: u32 = get_param(matches, "gpio")?;
	let timing = timing(matches)?;
	debug!("Using GPIO {} with {:?}", gpio, timing);

	let pin = linux::open_signal_pin(gpio)?;
	let mut dev = Sha204::new(BitBang::new(pin, timing), timing);

	dev.wakeup().map_err(|e| format_err!("failed to wake up device: {}", e))?;

	let res = f(&mut dev);

	if let Err(e) = dev.sleep() {
		warn!("Failed to send device to sleep: {}", e);
	}

	res
}

fn dump_config(dev: &mut Device) -> AResult<()> {
	let config = provision::read_config_zone(dev)?;
	for (i, line) in config.chunks(16).enumerate() {
		println!("{:02x}: {}", i * 16, hex(line));
	}
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg gpio: -g --gpio +takes_value +required "GPIO number of the signal line")
		(@arg bit_unit: --bit_unit +takes_value "pulse unit width in microseconds")
		(@arg start_polls: --start_polls +takes_value "pin reads while waiting for a start pulse")
		(@arg zero_polls: --zero_polls +takes_value "pin reads while waiting for the second pulse of a zero bit")
		(@subcommand wakeup =>
			(about: "wake up the device and check its response")
		)
		(@subcommand sleep =>
			(about: "send the device to sleep")
		)
		(@subcommand serial =>
			(about: "show serial number")
		)
		(@subcommand revision =>
			(about: "show device revision")
		)
		(@subcommand random =>
			(about: "show 32 random bytes")
			(@arg no_seed_update: --no_seed_update "don't update the EEPROM seed first")
		)
		(@subcommand read =>
			(about: "read 4 (or 32) bytes from a zone")
			(@arg long: -l --long "read 32 bytes")
			(@arg ZONE: +required "zone: config, otp or data")
			(@arg ADDRESS: +required "byte address (decimal or 0x-prefixed hex)")
		)
		(@subcommand dump_config =>
			(about: "dump the whole config zone")
		)
		(@subcommand configure_key =>
			(about: "configure slots for key derivation")
		)
		(@subcommand lock_config =>
			(about: "lock the config zone (can't be undone)")
		)
	).get_matches();

	match matches.subcommand() {
		("wakeup", _) => with_device(&matches, |_| {
			info!("Device is awake");
			Ok(())
		}),
		("sleep", _) => with_device(&matches, |_| Ok(())),
		("serial", _) => with_device(&matches, |dev| {
			println!("{}", hex(&provision::serial_number(dev)?));
			Ok(())
		}),
		("revision", _) => with_device(&matches, |dev| {
			print_response(&dev.dev_rev()?);
			Ok(())
		}),
		("random", Some(sub_m)) => {
			let seed_update = !sub_m.is_present("no_seed_update");
			with_device(&matches, |dev| {
				print_response(&dev.random(seed_update)?);
				Ok(())
			})
		},
		("read", Some(sub_m)) => {
			let zone = parse_zone(sub_m.value_of("ZONE").unwrap_or_default())?;
			let address = parse_address(sub_m.value_of("ADDRESS").unwrap_or_default())?;
			let long = sub_m.is_present("long");
			with_device(&matches, |dev| {
				print_response(&dev.read(zone, address, long)?);
				Ok(())
			})
		},
		("dump_config", _) => with_device(&matches, dump_config),
		("configure_key", _) => with_device(&matches, |dev| {
			if !provision::configure_key(dev)? {
				info!("Nothing to do");
			}
			Ok(())
		}),
		("lock_config", _) => with_device(&matches, |dev| {
			if !provision::lock_config_zone(dev)? {
				info!("Nothing to do");
			}
			Ok(())
		}),
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
