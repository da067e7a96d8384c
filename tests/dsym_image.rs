use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use sd::cli::Args;
use sd::macho::load::{Dysymtab, Load, Nlist, Section, Segment, Symbol, Symtab};
use sd::macho::read::parse;
use sd::macho::toc::FileTOC;
use sd::macho::{ByteOrder, Cpu, FileHeader, HdrType, LoadCmd, MAGIC_64};

#[test]
fn rejects_invalid_magic() {
    let data = [0xde, 0xad, 0xbe, 0xef];
    let err = parse(&data).expect_err("parser must reject unknown magic");
    assert_eq!(err.offset, 0);
    assert!(err.to_string().contains("invalid magic"));
}

#[test]
fn splits_an_executable_end_to_end() {
    let uniq = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("sd-e2e-test-{uniq}"));
    fs::create_dir_all(&dir).expect("mkdir");
    let input = dir.join("hello");
    let output = dir.join("hello.dwarf");
    fs::write(&input, executable_fixture()).expect("write input");

    sd::run(Args {
        inputs: vec![
            input.to_string_lossy().to_string(),
            output.to_string_lossy().to_string(),
        ],
        verbose: false,
    })
    .expect("split must succeed");

    let bytes = fs::read(&output).expect("read output");
    let dsym = parse(&bytes).expect("output must be a well-formed Mach-O");
    assert_eq!(dsym.toc.header.filetype, HdrType::DSYM);
    assert_eq!(dsym.toc.header.cpu, Cpu::AMD64);
    assert_eq!(dsym.toc.load_size(), u64::from(dsym.toc.header.cmdsz));

    let symtab = dsym.symtab().expect("symtab");
    assert_eq!(symtab.nsyms, 2);
    assert_eq!(symtab.syms[0].name, "_start");
    assert_eq!(symtab.syms[1].name, "_main");
    assert_eq!(symtab.symoff, 4096);

    let linkedit = dsym.segment("__LINKEDIT").expect("linkedit");
    assert_eq!(linkedit.offset, 4096);
    let dwarf = dsym.segment("__DWARF").expect("dwarf");
    assert_eq!(dwarf.offset, 8192);
    assert_eq!(dwarf.filesz, 0x20);
    assert_eq!(&bytes[8192..8192 + 0x20], &[0x11u8; 0x20]);

    let _ = fs::remove_file(&output);
    let _ = fs::remove_file(&input);
    let _ = fs::remove_dir(&dir);
}

fn segment64(name: &str, addr: u64, memsz: u64, offset: u64, filesz: u64, nsect: u32) -> Segment {
    Segment {
        cmd: LoadCmd::SEGMENT_64,
        len: 0,
        name: name.to_string(),
        addr,
        memsz,
        offset,
        filesz,
        maxprot: 7,
        prot: 5,
        nsect,
        flags: 0,
        firstsect: 0,
    }
}

fn section64(name: &str, seg: &str, addr: u64, size: u64, offset: u32) -> Section {
    Section {
        name: name.to_string(),
        seg: seg.to_string(),
        addr,
        size,
        offset,
        align: 0,
        reloff: 0,
        nreloc: 0,
        flags: 0,
        reserved1: 0,
        reserved2: 0,
        reserved3: 0,
        relocs: Vec::new(),
    }
}

/// 64-bit little-endian executable with three symbols, the last two
/// externally defined, and a single uncompressed DWARF section.
fn executable_fixture() -> Vec<u8> {
    let order = ByteOrder::Little;
    let mut toc = FileTOC {
        header: FileHeader {
            magic: MAGIC_64,
            cpu: Cpu::AMD64,
            subcpu: 3,
            filetype: HdrType::EXEC,
            ncmd: 0,
            cmdsz: 0,
            flags: 0x85,
        },
        byte_order: order,
        loads: Vec::new(),
        sections: Vec::new(),
    };

    let names = ["_local", "_start", "_main"];
    let mut strtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for name in names {
        name_offsets.push(strtab.len() as u32);
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
    }
    let syms: Vec<Symbol> = names
        .iter()
        .enumerate()
        .map(|(i, name)| Symbol {
            name: (*name).to_string(),
            typ: if i == 0 { 0x0e } else { 0x0f },
            sect: 1,
            desc: 0,
            value: 0x1_0000_0f00 + i as u64 * 0x10,
        })
        .collect();

    let symoff = 0x2000u32;
    let stroff = 0x2100u32;
    toc.add_load(Load::Symtab(Symtab {
        len: 24,
        symoff,
        nsyms: syms.len() as u32,
        stroff,
        strsize: strtab.len() as u32,
        syms: syms.clone(),
    }));
    toc.add_load(Load::Dysymtab(Dysymtab {
        len: 80,
        ilocalsym: 0,
        nlocalsym: 1,
        iextdefsym: 1,
        nextdefsym: 2,
        iundefsym: 3,
        nundefsym: 0,
        tocoffset: 0,
        ntoc: 0,
        modtaboff: 0,
        nmodtab: 0,
        extrefsymoff: 0,
        nextrefsyms: 0,
        indirectsymoff: 0,
        nindirectsyms: 0,
        extreloff: 0,
        nextrel: 0,
        locreloff: 0,
        nlocrel: 0,
        indirect_syms: Vec::new(),
    }));

    toc.add_segment(segment64("__PAGEZERO", 0, 0x1_0000_0000, 0, 0, 0));
    toc.add_segment(segment64("__TEXT", 0x1_0000_0000, 0x1000, 0, 0x1000, 1));
    toc.add_section(section64("__text", "__TEXT", 0x1_0000_0f00, 0x20, 0xf00));
    toc.add_segment(segment64("__DATA", 0x1_0000_1000, 0x1000, 0x1000, 0x100, 0));
    toc.add_segment(segment64("__LINKEDIT", 0x1_0000_2000, 0x1000, 0x2000, 0x200, 0));
    toc.add_segment(segment64("__DWARF", 0x1_0000_3000, 0x1000, 0x3000, 0x20, 1));
    toc.add_section(section64("__debug_info", "__DWARF", 0x1_0000_3000, 0x20, 0x3000));

    let mut image = vec![0u8; toc.file_size() as usize];
    toc.put(&mut image);

    let mut off = symoff as usize;
    for (i, sym) in syms.iter().enumerate() {
        let n = Nlist {
            name: name_offsets[i],
            typ: sym.typ,
            sect: sym.sect,
            desc: sym.desc,
            value: sym.value,
        };
        off += n.put(&mut image[off..], order, true);
    }
    image[stroff as usize..stroff as usize + strtab.len()].copy_from_slice(&strtab);
    image[0x3000..0x3020].copy_from_slice(&[0x11u8; 0x20]);
    image
}
