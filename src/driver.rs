use std::io::Write;

use anyhow::{anyhow, Result};

use crate::cli::Args;
use crate::dsym;
use crate::macho::load::Load;
use crate::macho::read;
use crate::macho::toc::FileTOC;

const USAGE: &str = "\
Usage: sd INPUT [ OUTPUT ]
Reads the executable INPUT, extracts debugging into OUTPUT.
If OUTPUT is not specified, the path
      INPUT.dSYM/Contents/Resources/DWARF/INPUT
is used instead.";

/// Runs the splitter pipeline: read the input executable, parse it,
/// synthesize the dSYM image, and write it out. Any other argument
/// count prints usage and succeeds.
///
/// # Errors
/// Every failure is fatal: unreadable input, malformed Mach-O, missing
/// required load commands or segments, or an unwritable output.
pub fn run(args: Args) -> Result<()> {
    let (input, output) = match args.inputs.as_slice() {
        [input] => (input.clone(), None),
        [input, output] => (input.clone(), Some(output.clone())),
        _ => {
            println!("{USAGE}");
            return Ok(());
        }
    };

    let bytes = std::fs::read(&input).map_err(|err| anyhow!("could not open {input}: {err}"))?;
    let exe = read::parse(&bytes).map_err(|err| anyhow!("{input}: {err}"))?;
    if args.verbose {
        describe(&exe.toc);
    }

    let image = dsym::build(&exe, &input)?;

    let outdwarf = match output {
        Some(path) => path,
        None => {
            let dir = default_output_dir(&input);
            create_dir_all_mode(&dir).map_err(|err| {
                anyhow!("could not create directory for debugging symbols {dir}: {err}")
            })?;
            format!("{dir}/{input}")
        }
    };
    write_file_mode(&outdwarf, &image)
        .map_err(|err| anyhow!("could not create output dwarf/dsym file {outdwarf}: {err}"))?;
    if args.verbose {
        eprintln!("wrote {} bytes to {outdwarf}", image.len());
    }
    Ok(())
}

fn default_output_dir(input: &str) -> String {
    format!("{input}.dSYM/Contents/Resources/DWARF")
}

fn describe(t: &FileTOC) {
    eprintln!("type = {}, flags = {:#x}", t.header.filetype, t.header.flags);
    for (i, l) in t.loads.iter().enumerate() {
        if let Load::Segment(s) = l {
            eprintln!(
                "load {i} is segment {}, offset={:#x}, filesz={}, addr={:#x}, memsz={}, nsect={}",
                s.name, s.offset, s.filesz, s.addr, s.memsz, s.nsect
            );
            for j in s.firstsect..s.firstsect + s.nsect {
                let c = &t.sections[j as usize];
                eprintln!(
                    "   section {}, offset={:#x}, size={}, addr={:#x}, flags={:#x}, nreloc={}",
                    c.name, c.offset, c.size, c.addr, c.flags, c.nreloc
                );
            }
        } else {
            eprintln!("load {i} is {}", l.cmd());
        }
    }
    eprintln!(
        "recorded command size {}, computed command size {}",
        t.header.cmdsz,
        t.load_size()
    );
    eprintln!("file size is {}", t.file_size());
}

fn create_dir_all_mode(dir: &str) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    std::os::unix::fs::DirBuilderExt::mode(&mut builder, 0o755);
    builder.create(dir)
}

fn write_file_mode(path: &str, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o755);
    let mut file = options.open(path)?;
    file.write_all(data)
}
