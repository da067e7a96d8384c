use anyhow::{anyhow, Result};

use crate::macho::load::{Load, Nlist, Segment};
use crate::macho::read::File;
use crate::macho::toc::FileTOC;
use crate::macho::{round_up, HdrType, LoadCmd};

const PAGE_ALIGN: u32 = 12; // 4096 = 1 << 12

/// Builds a complete dSYM image from a parsed executable: the uuid (if
/// any), a symbol table restricted to the externally-defined symbols,
/// the original segment skeleton with __TEXT and __DATA emptied of
/// file contents, a rebuilt __LINKEDIT holding the abbreviated symbol
/// and string tables, and an uncompressed __DWARF payload.
///
/// # Errors
/// Fails when the input lacks a symtab, a dysymtab, or any of the
/// required segments, and on malformed compressed debug sections.
pub fn build(exe: &File<'_>, input_name: &str) -> Result<Vec<u8>> {
    let symtab = exe
        .symtab()
        .ok_or_else(|| anyhow!("input file {input_name} lacks load command symtab"))?;
    let dysymtab = exe
        .dysymtab()
        .ok_or_else(|| anyhow!("input file {input_name} lacks load command dysymtab"))?;
    let segment = |name: &str| -> Result<&Segment> {
        exe.segment(name)
            .ok_or_else(|| anyhow!("input file {input_name} lacks segment {name}"))
    };
    let text = segment("__TEXT")?;
    let data = segment("__DATA")?;
    let linkedit = segment("__LINKEDIT")?;
    let pagezero = segment("__PAGEZERO")?;
    let dwarf = segment("__DWARF")?;

    let uuid = exe
        .toc
        .loads
        .iter()
        .find(|l| l.cmd() == LoadCmd::UUID)
        .cloned();

    let mut newtoc = exe.toc.derived_copy(HdrType::DSYM, 0);

    // __LINKEDIT layout: symbols at the second page, strings directly
    // after them, with a ' ', NUL sentinel so the first real string
    // lands at offset 2.
    let linkeditsymbase: u32 = 1 << PAGE_ALIGN;
    let linkeditstringbase: u32 =
        linkeditsymbase + exe.toc.symbol_size() * dysymtab.nextdefsym;
    let mut linkeditstringcur: u32 = 2;

    let mut linkeditsyms = Vec::with_capacity(dysymtab.nextdefsym as usize);
    let mut linkeditstrings = Vec::with_capacity(dysymtab.nextdefsym as usize);

    let mut newsymtab = symtab.clone();
    newsymtab.syms.clear();
    newsymtab.symoff = linkeditsymbase;
    newsymtab.stroff = linkeditstringbase;
    newsymtab.nsyms = dysymtab.nextdefsym;
    for i in 0..dysymtab.nextdefsym {
        let ii = (i + dysymtab.iextdefsym) as usize;
        let oldsym = symtab.syms.get(ii).ok_or_else(|| {
            anyhow!("input file {input_name} symbol table lacks external definition {ii}")
        })?;
        newsymtab.syms.push(oldsym.clone());
        linkeditsyms.push(Nlist {
            name: linkeditstringcur,
            typ: oldsym.typ,
            sect: oldsym.sect,
            desc: oldsym.desc,
            value: oldsym.value,
        });
        linkeditstringcur += oldsym.name.len() as u32 + 1;
        linkeditstrings.push(oldsym.name.as_str());
    }
    newsymtab.strsize = linkeditstringcur;

    if let Some(uuid) = uuid {
        newtoc.add_load(uuid);
    }
    newtoc.add_load(Load::Symtab(newsymtab));
    newtoc.add_segment(pagezero.clone());
    newtoc.add_segment(text.copy_zeroed());
    copy_zeroed_sections(&mut newtoc, &exe.toc, text);
    newtoc.add_segment(data.copy_zeroed());
    copy_zeroed_sections(&mut newtoc, &exe.toc, data);

    let mut newlinkedit = linkedit.clone();
    newlinkedit.offset = u64::from(linkeditsymbase);
    newlinkedit.filesz = u64::from(linkeditstringcur);
    newlinkedit.addr = round_up(data.addr + data.memsz, 1 << PAGE_ALIGN);
    newlinkedit.memsz = round_up(newlinkedit.filesz, 1 << PAGE_ALIGN);
    let le_offset = newlinkedit.offset;
    let le_filesz = newlinkedit.filesz;
    let le_addr = newlinkedit.addr;
    let le_memsz = newlinkedit.memsz;
    newtoc.add_segment(newlinkedit);

    let mut newdwarf = dwarf.copy_zeroed();
    newdwarf.offset = round_up(le_offset + le_filesz, 1 << PAGE_ALIGN);
    newdwarf.filesz = exe.segment_uncompressed_size(dwarf, 1)?;
    newdwarf.addr = le_addr + le_memsz;
    newdwarf.memsz = round_up(newdwarf.filesz, 1 << PAGE_ALIGN);
    let dwarf_base = newdwarf.offset;
    newtoc.add_segment(newdwarf);

    let new_firstsect = newtoc.sections.len();
    let mut offset = dwarf_base as u32;
    for i in dwarf.firstsect..dwarf.firstsect + dwarf.nsect {
        let old = &exe.toc.sections[i as usize];
        let mut s = old.copy();
        s.offset = offset;
        let us = exe.section_uncompressed_size(old)?;
        if s.size < us {
            s.size = us;
            s.align = 0; // debug sections tolerate this
        }
        offset += us as u32;
        if let Some(rest) = s.name.strip_prefix("__z") {
            s.name = format!("__{rest}");
        }
        s.reloff = 0;
        s.nreloc = 0;
        newtoc.add_section(s);
    }

    let mut buffer = vec![0u8; newtoc.file_size() as usize];

    // __LINKEDIT payload: symbols first, then the sentinel and the
    // string table.
    let is_64 = newtoc.is_64();
    let bo = newtoc.byte_order;
    let mut off = le_offset as usize;
    for nlist in &linkeditsyms {
        off += nlist.put(&mut buffer[off..], bo, is_64);
    }
    let strbase = linkeditstringbase as usize;
    buffer[strbase] = b' ';
    buffer[strbase + 1] = 0;
    let mut off = strbase + 2;
    for name in &linkeditstrings {
        buffer[off..off + name.len()].copy_from_slice(name.as_bytes());
        off += name.len();
        buffer[off] = 0;
        off += 1;
    }

    // __DWARF payload at the offsets just recorded in the new headers.
    for (k, i) in (dwarf.firstsect..dwarf.firstsect + dwarf.nsect).enumerate() {
        let old = &exe.toc.sections[i as usize];
        let dst = newtoc.sections[new_firstsect + k].offset as usize;
        exe.put_uncompressed_data(old, &mut buffer[dst..])?;
    }

    // __TEXT nominally overlaps this range in a real executable, so the
    // header and load commands go in last.
    newtoc.put(&mut buffer);

    Ok(buffer)
}

fn copy_zeroed_sections(newtoc: &mut FileTOC, src: &FileTOC, seg: &Segment) {
    for i in seg.firstsect..seg.firstsect + seg.nsect {
        let mut s = src.sections[i as usize].copy();
        s.offset = 0;
        s.reloff = 0;
        s.nreloc = 0;
        newtoc.add_section(s);
    }
}
