// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    log::{info, LevelFilter},
    std::path::PathBuf,
    xpi_signing::{
        DigestAlgorithm, EntryCompression, Error, HttpSigningAuthority, SignatureBlockKind,
        SigningSession, SigningSettings, XpiResult, DEFAULT_SIGNATURE_NAME,
    },
};

const SIGN_ABOUT: &str = "\
Sign an add-on (XPI) file in place using a remote signing service.

A manifest of digests of every file in the add-on and a signature file
over that manifest are generated locally. The signature file is sent to
the signing service given by --signer, which returns a signature block.
All three are added to the archive under META-INF/.

The add-on identifier sent to the signing service is read from the add-on's
install.rdf or manifest.json unless --guid is given.

The file is only replaced once a signed archive has been fully written and
verified.
";

fn settings_from_args(args: &ArgMatches) -> XpiResult<SigningSettings> {
    let mut settings = SigningSettings::default();

    if let Some(values) = args.values_of("digest") {
        settings.set_digest_algorithms(
            values
                .map(DigestAlgorithm::try_from)
                .collect::<Result<Vec<_>, Error>>()?,
        )?;
    }

    if let Some(name) = args.value_of("signature_name") {
        settings.set_signature_name(name)?;
    }

    if let Some(kind) = args.value_of("block_kind") {
        settings.set_block_kind(SignatureBlockKind::try_from(kind)?);
    }

    if args.is_present("store") {
        settings.set_compression(EntryCompression::Stored);
    }

    if args.is_present("omit_signature_sections") {
        settings.set_include_signature_sections(false);
    }

    Ok(settings)
}

fn command_sign(args: &ArgMatches) -> XpiResult<()> {
    let path = PathBuf::from(
        args.value_of("path")
            .expect("clap should have validated arguments"),
    );
    let signer = args
        .value_of("signer")
        .expect("clap should have validated arguments");
    let addon_id = args.value_of("guid");

    let settings = settings_from_args(args)?;
    let authority = HttpSigningAuthority::new(signer, &settings)?;
    info!("signing {} using {}", path.display(), authority.endpoint());

    SigningSession::new(&settings).sign_file_in_place(&path, &authority, addon_id)?;

    println!("{} signed!", path.display());

    Ok(())
}

fn main_impl() -> XpiResult<()> {
    let app = Command::new("xpisign")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Sign browser add-on (XPI) files")
        .long_about(SIGN_ABOUT)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("signer")
                .long("signer")
                .short('s')
                .takes_value(true)
                .required(true)
                .help("URL of the signing service"),
        )
        .arg(
            Arg::new("guid")
                .long("guid")
                .short('g')
                .takes_value(true)
                .help("Add-on identifier to use instead of the one in the add-on"),
        )
        .arg(
            Arg::new("digest")
                .long("digest")
                .takes_value(true)
                .possible_values(["md5", "sha1", "sha256"])
                .multiple_occurrences(true)
                .help("Digest algorithm to record in the manifest (default: sha1 and sha256)"),
        )
        .arg(
            Arg::new("signature_name")
                .long("signature-name")
                .takes_value(true)
                .default_value(DEFAULT_SIGNATURE_NAME)
                .help("Base name of the signature file and signature block"),
        )
        .arg(
            Arg::new("block_kind")
                .long("block-kind")
                .takes_value(true)
                .possible_values(["rsa", "dsa", "ec"])
                .default_value("rsa")
                .help("Kind of signature block returned by the signing service"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .help("Store signature entries without compression"),
        )
        .arg(
            Arg::new("omit_signature_sections")
                .long("omit-signature-sections")
                .help("Only write whole-manifest digests to the signature file"),
        )
        .arg(
            Arg::new("path")
                .required(true)
                .help("Path to add-on file to sign"),
        );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    // rustls is chatty at info level.
    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();

    command_sign(&matches)
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };

    std::process::exit(exit_code)
}
