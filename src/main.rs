/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{stdin, stdout, Cursor, IsTerminal, Read, Write};
use std::time::Duration;

use jpeg_recode::{
    decode_container, dump_jpeg, encode_container, get_version_string, CpuTimeMeasure,
    EnabledFeatures, ExitCode, Metrics, RecodeError,
};
use log::info;
use simple_logger::SimpleLogger;

type Result<T> = std::result::Result<T, RecodeError>;

fn syntax_error<T>(message: impl AsRef<str>) -> Result<T> {
    Err(RecodeError::new(ExitCode::SyntaxError, message))
}

fn parse_numeric_parameter(arg: &str, name: &str) -> Result<Option<u32>> {
    match arg.strip_prefix(name) {
        Some(v) => match v.parse::<u32>() {
            Ok(x) => Ok(Some(x)),
            Err(e) => syntax_error(format!("invalid value for {0} {1}", name, e)),
        },
        None => Ok(None),
    }
}

fn os_to_string(s: OsString) -> Result<String> {
    s.into_string()
        .or_else(|s| syntax_error(format!("argument {0:?} is not valid unicode", s)))
}

// wrap main so that errors get printed nicely without a panic
fn main_with_result() -> Result<()> {
    let mut args = pico_args::Arguments::from_env();

    let dump = args.contains("-dump");
    let all = args.contains("-all");
    let verify = args.contains("-verify");
    let overwrite = args.contains("-overwrite");

    let mut filenames = Vec::new();
    let mut iterations = 1;
    let mut enabled_features = EnabledFeatures::default();

    // only output the log if we are connected to a console (otherwise if there is redirection we would corrupt the file)
    if stdout().is_terminal() {
        // fails only if a logger was already installed
        let _ = SimpleLogger::new().init();
    }

    for arg in args.finish() {
        let arg = os_to_string(arg)?;

        if arg.starts_with('-') {
            if let Some(x) = parse_numeric_parameter(&arg, "-iter:")? {
                iterations = x.max(1);
            } else if let Some(x) = parse_numeric_parameter(&arg, "-max-size:")? {
                enabled_features.max_jpeg_file_size = x;
            } else if let Some(x) = parse_numeric_parameter(&arg, "-max-width:")? {
                enabled_features.max_jpeg_width = x;
            } else if let Some(x) = parse_numeric_parameter(&arg, "-max-height:")? {
                enabled_features.max_jpeg_height = x;
            } else if arg == "-acceptdqtswithzeros" {
                enabled_features.reject_dqts_with_zeros = false;
            } else if arg == "-version" {
                println!("jpeg_recode_util {0}", get_version_string());
                return Ok(());
            } else {
                return syntax_error(format!("unknown switch {0}", arg));
            }
        } else {
            filenames.push(arg);
        }
    }

    let mut input_data = Vec::new();
    if filenames.is_empty() {
        if stdin().is_terminal() {
            return syntax_error("source filename is needed or input needs to be redirected");
        }

        stdin().read_to_end(&mut input_data)?;
    } else {
        let mut file_in = File::open(&filenames[0])
            .map_err(|e| RecodeError::new(ExitCode::FileNotFound, e.to_string()))?;

        file_in.read_to_end(&mut input_data)?;
    }

    if dump {
        return dump_jpeg(&input_data, all, &enabled_features);
    }

    if filenames.len() < 2 && stdout().is_terminal() {
        return syntax_error("destination filename is needed or output needs to be redirected");
    }

    if input_data.len() < 2 {
        return Err(RecodeError::new(
            ExitCode::BadContainerFile,
            "input file too small",
        ));
    }

    let is_jpeg = input_data[0] == 0xff && input_data[1] == 0xd8;

    let mut metrics = Metrics::default();
    let mut output_data = Vec::new();

    for _ in 0..iterations {
        let thread_cpu = CpuTimeMeasure::new();

        output_data = Vec::with_capacity(input_data.len());

        if is_jpeg {
            // verification against the input is always done while packing
            encode_container(&input_data, &mut output_data, &enabled_features)?;

            if verify {
                let mut roundtrip = Vec::with_capacity(input_data.len());
                decode_container(
                    &mut Cursor::new(&output_data),
                    &mut roundtrip,
                    &enabled_features,
                )?;

                if roundtrip != input_data {
                    return Err(RecodeError::new(
                        ExitCode::VerificationContentMismatch,
                        "unpacked container does not match the input",
                    ));
                }
            }
        } else {
            decode_container(
                &mut Cursor::new(&input_data),
                &mut output_data,
                &enabled_features,
            )?;
        }

        let iter_duration = thread_cpu.elapsed();
        info!("Total CPU time consumed:{0}ms", iter_duration.as_millis());

        let (jpeg_len, container_len) = if is_jpeg {
            (input_data.len(), output_data.len())
        } else {
            (output_data.len(), input_data.len())
        };
        metrics.record(jpeg_len as u64, container_len as u64, iter_duration);
    }

    info!(
        "jpeg {0} bytes, container {1} bytes (ratio = {2:.1}%)",
        metrics.jpeg_bytes / u64::from(metrics.files),
        metrics.container_bytes / u64::from(metrics.files),
        metrics.ratio()
    );

    if filenames.len() < 2 {
        stdout().write_all(&output_data)?;
    } else {
        let mut fileout = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(overwrite)
            .create_new(!overwrite)
            .open(&filenames[1])?;

        fileout.write_all(&output_data)?;
    }

    if iterations > 1 {
        info!(
            "Overall average CPU consumed per iteration {0}ms ",
            (metrics.cpu_time / iterations).as_millis()
        );
    }

    Ok(())
}

fn main() {
    let start = CpuTimeMeasure::new();

    match main_with_result() {
        Ok(_) => {
            let elapsed: Duration = start.elapsed();
            info!("done in {0}ms cpu", elapsed.as_millis());
        }
        Err(e) => {
            eprintln!(
                "error code: {0} {1} {2}",
                e.exit_code(),
                e.exit_code().as_integer_error_code(),
                e.message()
            );
            std::process::exit(e.exit_code().as_integer_error_code());
        }
    }
}
