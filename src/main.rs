mod logger;
mod partition;

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use fat_reader_rs::fat::{Attributes, DirEntry, FatFs, RootDir};
use fat_reader_rs::{FatError, ReadBytes};
use log::{info, LevelFilter};

use crate::partition::Partition;

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Info,
    List(String),
    Cat(String),
}

#[derive(Debug)]
struct Config {
    image: String,
    sector_size: u32,
    log_level: LevelFilter,
    action: Action,
}

impl Config {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let image = matches.value_of("IMAGE").context("No image given")?.to_string();
        let sector_size = matches.value_of("sector-size").unwrap_or("512");
        let sector_size: u32 =
            sector_size.parse().with_context(|| format!("Invalid sector size '{}'", sector_size))?;
        if !sector_size.is_power_of_two() {
            bail!("Sector size {} is not a power of two", sector_size);
        }
        let log_level = logger::level_from_verbosity(matches.occurrences_of("verbose"));

        let action = match matches.subcommand() {
            ("info", _) => Action::Info,
            ("ls", Some(sub_matches)) => Action::List(sub_matches.value_of("PATH").unwrap_or("/").to_string()),
            ("cat", Some(sub_matches)) => {
                Action::Cat(sub_matches.value_of("PATH").context("No path given")?.to_string())
            }
            (other, _) => bail!("Unknown command '{}'", other),
        };
        Ok(Self { image, sector_size, log_level, action })
    }
}

fn build_cli() -> App<'static, 'static> {
    App::new("fat-reader-rs")
        .version(crate_version!())
        .about("Inspects FAT16 and FAT32 partitions without mounting them")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("IMAGE").help("Disk image or block device with an MBR").required(true).index(1))
        .arg(
            Arg::with_name("sector-size")
                .short("s")
                .long("sector-size")
                .takes_value(true)
                .default_value("512")
                .help("Bytes per sector, must match the volume"),
        )
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Log more, repeat for debug and trace output"))
        .subcommand(SubCommand::with_name("info").about("Prints the volume geometry"))
        .subcommand(
            SubCommand::with_name("ls")
                .about("Lists a directory")
                .arg(Arg::with_name("PATH").default_value("/").index(1)),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Writes a file to stdout")
                .arg(Arg::with_name("PATH").required(true).index(1)),
        )
}

fn main() {
    let matches = build_cli().get_matches();
    let result = Config::from_matches(&matches).and_then(|config| run(&config));
    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<()> {
    logger::init(config.log_level);
    let partition = Partition::open(&config.image).with_context(|| format!("Failed to open {}", config.image))?;
    info!("Opened {}, {} bytes", config.image, partition.len());
    let fs = FatFs::mount(partition, config.sector_size)
        .with_context(|| format!("Failed to mount {}", config.image))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &config.action {
        Action::Info => print_info(&fs, &mut out)?,
        Action::List(path) => list(&fs, path, &mut out)?,
        Action::Cat(path) => {
            let mut reader = fs.open_reader(path)?;
            io::copy(&mut reader, &mut out).with_context(|| format!("Failed to read {}", path))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn print_info<R: ReadBytes>(fs: &FatFs<R>, out: &mut impl Write) -> Result<()> {
    let boot_sector = fs.boot_sector();
    writeln!(out, "Type:               {}", fs.fat_type())?;
    writeln!(out, "OEM name:           {}", String::from_utf8_lossy(boot_sector.oem_name()))?;
    writeln!(out, "Volume label:       {}", fs.volume_label())?;
    writeln!(out, "Bytes per sector:   {}", fs.sector_size())?;
    writeln!(out, "Bytes per cluster:  {}", fs.cluster_size())?;
    writeln!(out, "Clusters:           {}", fs.cluster_count())?;
    writeln!(out, "Partition start:    {}", fs.partition_start())?;
    writeln!(out, "FATs:               {} x {} sectors", boot_sector.fat_count, boot_sector.sectors_per_fat())?;
    writeln!(out, "First FAT sector:   {}", fs.first_fat_sector())?;
    writeln!(out, "First data sector:  {}", fs.first_data_sector())?;
    match fs.root_dir() {
        RootDir::Region { first_sector, entry_count } => {
            writeln!(out, "Root directory:     sector {}, {} entries", first_sector, entry_count)?
        }
        RootDir::Cluster(cluster) => writeln!(out, "Root directory:     cluster {}", cluster)?,
    }
    Ok(())
}

fn list<R: ReadBytes>(fs: &FatFs<R>, path: &str, out: &mut impl Write) -> Result<()> {
    let entries = match fs.list(path) {
        Ok(entries) => entries,
        // like ls, show a single entry for a file
        Err(FatError::NotADirectory(_)) => vec![fs.stat(path)?],
        Err(err) => return Err(err.into()),
    };
    for entry in entries.iter().filter(|entry| !entry.dentry.is_volume_id()) {
        writeln!(out, "{}", format_entry(entry))?;
    }
    Ok(())
}

fn format_entry(entry: &DirEntry) -> String {
    let modified = entry
        .modified()
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".repeat(19));
    format!(
        "{} {:>10} {} {:>8} {}",
        format_attributes(entry.attributes()),
        entry.size(),
        modified,
        entry.first_cluster(),
        entry.name()
    )
}

fn format_attributes(attrs: Attributes) -> String {
    [
        (Attributes::DIRECTORY, 'd'),
        (Attributes::READ_ONLY, 'r'),
        (Attributes::HIDDEN, 'h'),
        (Attributes::SYSTEM, 's'),
        (Attributes::ARCHIVE, 'a'),
    ]
    .iter()
    .map(|&(flag, c)| if attrs.contains(flag) { c } else { '-' })
    .collect()
}
