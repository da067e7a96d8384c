use crate::macho::toc::FileTOC;
use crate::macho::{round_up, ByteOrder, LoadCmd};

pub const SEGMENT_CMD_SIZE_32: u64 = 56;
pub const SEGMENT_CMD_SIZE_64: u64 = 72;
pub const SECTION_SIZE_32: u64 = 68;
pub const SECTION_SIZE_64: u64 = 80;
pub const SYMTAB_CMD_SIZE: u64 = 24;
pub const DYSYMTAB_CMD_SIZE: u64 = 80;
pub const DYLIB_CMD_SIZE: u64 = 24;
pub const DYLINKER_CMD_SIZE: u64 = 12;
pub const RPATH_CMD_SIZE: u64 = 12;
pub const LINKEDIT_DATA_CMD_SIZE: u64 = 16;
pub const ENCRYPTION_INFO_CMD_SIZE_32: u64 = 20;
pub const ENCRYPTION_INFO_CMD_SIZE_64: u64 = 24;
pub const DYLD_INFO_CMD_SIZE: u64 = 48;
pub const NLIST_SIZE_32: u64 = 12;
pub const NLIST_SIZE_64: u64 = 16;

/// One Mach-O load command. Commands the tool does not model keep
/// their raw bytes under [`Load::Raw`] so they can be re-emitted
/// unchanged.
#[derive(Debug, Clone)]
pub enum Load {
    Segment(Segment),
    Symtab(Symtab),
    Dysymtab(Dysymtab),
    Dylib(Dylib),
    Dylinker(Dylinker),
    Rpath(Rpath),
    LinkEditData(LinkEditData),
    EncryptionInfo(EncryptionInfo),
    DyldInfo(DyldInfo),
    Raw(RawLoad),
}

impl Load {
    #[must_use]
    pub fn cmd(&self) -> LoadCmd {
        match self {
            Load::Segment(s) => s.cmd,
            Load::Symtab(_) => LoadCmd::SYMTAB,
            Load::Dysymtab(_) => LoadCmd::DYSYMTAB,
            Load::Dylib(_) => LoadCmd::DYLIB,
            Load::Dylinker(d) => d.cmd,
            Load::Rpath(_) => LoadCmd::RPATH,
            Load::LinkEditData(l) => l.cmd,
            Load::EncryptionInfo(e) => e.cmd,
            Load::DyldInfo(d) => d.cmd,
            Load::Raw(r) => r.cmd,
        }
    }

    /// Size of this command's wire form within the load-command block.
    /// The TOC supplies load alignment and bitness.
    #[must_use]
    pub fn load_size(&self, t: &FileTOC) -> u64 {
        match self {
            Load::Segment(s) => s.load_size(),
            Load::Symtab(_) => SYMTAB_CMD_SIZE,
            Load::Dysymtab(_) => DYSYMTAB_CMD_SIZE,
            Load::Dylib(d) => round_up(DYLIB_CMD_SIZE + d.name.len() as u64, t.load_align()),
            Load::Dylinker(d) => {
                round_up(DYLINKER_CMD_SIZE + d.name.len() as u64, t.load_align())
            }
            Load::Rpath(r) => round_up(RPATH_CMD_SIZE + r.path.len() as u64, t.load_align()),
            Load::LinkEditData(_) => LINKEDIT_DATA_CMD_SIZE,
            Load::EncryptionInfo(e) => {
                if e.cmd == LoadCmd::ENCRYPTION_INFO_64 {
                    ENCRYPTION_INFO_CMD_SIZE_64
                } else {
                    ENCRYPTION_INFO_CMD_SIZE_32
                }
            }
            Load::DyldInfo(_) => DYLD_INFO_CMD_SIZE,
            Load::Raw(r) => r.data.len() as u64,
        }
    }

    /// Writes the command's wire form to the front of `buf`, zero-padding
    /// to its computed size, and returns the number of bytes written.
    /// Segments also emit the section headers they own from the TOC's
    /// flat section list.
    pub fn put(&self, buf: &mut [u8], t: &FileTOC) -> usize {
        let bo = t.byte_order;
        let size = self.load_size(t) as usize;
        buf[..size].fill(0);
        match self {
            Load::Segment(s) => {
                let mut off = s.put_header(buf, bo);
                for i in s.firstsect..s.firstsect + s.nsect {
                    off += t.sections[i as usize].put(&mut buf[off..], bo, s.is_64());
                }
                off
            }
            Load::Symtab(s) => {
                bo.put_u32(&mut buf[0..], LoadCmd::SYMTAB.0);
                bo.put_u32(&mut buf[4..], SYMTAB_CMD_SIZE as u32);
                bo.put_u32(&mut buf[8..], s.symoff);
                bo.put_u32(&mut buf[12..], s.nsyms);
                bo.put_u32(&mut buf[16..], s.stroff);
                bo.put_u32(&mut buf[20..], s.strsize);
                size
            }
            Load::Dysymtab(d) => {
                bo.put_u32(&mut buf[0..], LoadCmd::DYSYMTAB.0);
                bo.put_u32(&mut buf[4..], DYSYMTAB_CMD_SIZE as u32);
                let fields = [
                    d.ilocalsym,
                    d.nlocalsym,
                    d.iextdefsym,
                    d.nextdefsym,
                    d.iundefsym,
                    d.nundefsym,
                    d.tocoffset,
                    d.ntoc,
                    d.modtaboff,
                    d.nmodtab,
                    d.extrefsymoff,
                    d.nextrefsyms,
                    d.indirectsymoff,
                    d.nindirectsyms,
                    d.extreloff,
                    d.nextrel,
                    d.locreloff,
                    d.nlocrel,
                ];
                for (i, v) in fields.iter().enumerate() {
                    bo.put_u32(&mut buf[8 + 4 * i..], *v);
                }
                size
            }
            Load::Dylib(d) => {
                bo.put_u32(&mut buf[0..], LoadCmd::DYLIB.0);
                bo.put_u32(&mut buf[4..], size as u32);
                bo.put_u32(&mut buf[8..], d.name_offset);
                bo.put_u32(&mut buf[12..], d.time);
                bo.put_u32(&mut buf[16..], d.current_version);
                bo.put_u32(&mut buf[20..], d.compat_version);
                put_tail_string(buf, d.name_offset as usize, &d.name);
                size
            }
            Load::Dylinker(d) => {
                bo.put_u32(&mut buf[0..], d.cmd.0);
                bo.put_u32(&mut buf[4..], size as u32);
                bo.put_u32(&mut buf[8..], d.name_offset);
                put_tail_string(buf, d.name_offset as usize, &d.name);
                size
            }
            Load::Rpath(r) => {
                bo.put_u32(&mut buf[0..], LoadCmd::RPATH.0);
                bo.put_u32(&mut buf[4..], size as u32);
                bo.put_u32(&mut buf[8..], r.path_offset);
                put_tail_string(buf, r.path_offset as usize, &r.path);
                size
            }
            Load::LinkEditData(l) => {
                bo.put_u32(&mut buf[0..], l.cmd.0);
                bo.put_u32(&mut buf[4..], LINKEDIT_DATA_CMD_SIZE as u32);
                bo.put_u32(&mut buf[8..], l.dataoff);
                bo.put_u32(&mut buf[12..], l.datasize);
                size
            }
            Load::EncryptionInfo(e) => {
                bo.put_u32(&mut buf[0..], e.cmd.0);
                bo.put_u32(&mut buf[4..], size as u32);
                bo.put_u32(&mut buf[8..], e.cryptoff);
                bo.put_u32(&mut buf[12..], e.cryptlen);
                bo.put_u32(&mut buf[16..], e.cryptid);
                if e.cmd == LoadCmd::ENCRYPTION_INFO_64 {
                    bo.put_u32(&mut buf[20..], e.pad);
                }
                size
            }
            Load::DyldInfo(d) => {
                bo.put_u32(&mut buf[0..], d.cmd.0);
                bo.put_u32(&mut buf[4..], DYLD_INFO_CMD_SIZE as u32);
                let fields = [
                    d.rebase_off,
                    d.rebase_len,
                    d.bind_off,
                    d.bind_len,
                    d.weak_bind_off,
                    d.weak_bind_len,
                    d.lazy_bind_off,
                    d.lazy_bind_len,
                    d.export_off,
                    d.export_len,
                ];
                for (i, v) in fields.iter().enumerate() {
                    bo.put_u32(&mut buf[8 + 4 * i..], *v);
                }
                size
            }
            Load::Raw(r) => {
                buf[..r.data.len()].copy_from_slice(&r.data);
                r.data.len()
            }
        }
    }
}

/// Logical segment header shared by the 32- and 64-bit wire layouts.
/// `firstsect` indexes this segment's first section in the owning
/// TOC's flat section list.
#[derive(Debug, Clone)]
pub struct Segment {
    pub cmd: LoadCmd,
    pub len: u32,
    pub name: String,
    pub addr: u64,
    pub memsz: u64,
    pub offset: u64,
    pub filesz: u64,
    pub maxprot: u32,
    pub prot: u32,
    pub nsect: u32,
    pub flags: u32,
    pub firstsect: u32,
}

impl Segment {
    #[must_use]
    pub fn is_64(&self) -> bool {
        self.cmd == LoadCmd::SEGMENT_64
    }

    #[must_use]
    pub fn load_size(&self) -> u64 {
        if self.is_64() {
            SEGMENT_CMD_SIZE_64 + u64::from(self.nsect) * SECTION_SIZE_64
        } else {
            SEGMENT_CMD_SIZE_32 + u64::from(self.nsect) * SECTION_SIZE_32
        }
    }

    /// Copy with its file presence erased: offset and size become zero,
    /// everything else carries over.
    #[must_use]
    pub fn copy_zeroed(&self) -> Segment {
        let mut s = self.clone();
        s.offset = 0;
        s.filesz = 0;
        s
    }

    fn put_header(&self, buf: &mut [u8], bo: ByteOrder) -> usize {
        bo.put_u32(&mut buf[0..], self.cmd.0);
        bo.put_u32(&mut buf[4..], self.load_size() as u32);
        put_name16(&mut buf[8..24], &self.name);
        if self.is_64() {
            bo.put_u64(&mut buf[24..], self.addr);
            bo.put_u64(&mut buf[32..], self.memsz);
            bo.put_u64(&mut buf[40..], self.offset);
            bo.put_u64(&mut buf[48..], self.filesz);
            bo.put_u32(&mut buf[56..], self.maxprot);
            bo.put_u32(&mut buf[60..], self.prot);
            bo.put_u32(&mut buf[64..], self.nsect);
            bo.put_u32(&mut buf[68..], self.flags);
            SEGMENT_CMD_SIZE_64 as usize
        } else {
            bo.put_u32(&mut buf[24..], self.addr as u32);
            bo.put_u32(&mut buf[28..], self.memsz as u32);
            bo.put_u32(&mut buf[32..], self.offset as u32);
            bo.put_u32(&mut buf[36..], self.filesz as u32);
            bo.put_u32(&mut buf[40..], self.maxprot);
            bo.put_u32(&mut buf[44..], self.prot);
            bo.put_u32(&mut buf[48..], self.nsect);
            bo.put_u32(&mut buf[52..], self.flags);
            SEGMENT_CMD_SIZE_32 as usize
        }
    }
}

/// Section header. `reserved3` is only meaningful when the owning
/// segment is 64-bit.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub seg: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
    pub relocs: Vec<Reloc>,
}

impl Section {
    /// Header-only copy; parsed relocation entries are not carried over.
    #[must_use]
    pub fn copy(&self) -> Section {
        Section {
            relocs: Vec::new(),
            ..self.clone()
        }
    }

    pub(crate) fn put(&self, buf: &mut [u8], bo: ByteOrder, is_64: bool) -> usize {
        put_name16(&mut buf[0..16], &self.name);
        put_name16(&mut buf[16..32], &self.seg);
        let mut off = 32;
        if is_64 {
            bo.put_u64(&mut buf[off..], self.addr);
            bo.put_u64(&mut buf[off + 8..], self.size);
            off += 16;
        } else {
            bo.put_u32(&mut buf[off..], self.addr as u32);
            bo.put_u32(&mut buf[off + 4..], self.size as u32);
            off += 8;
        }
        let words = [
            self.offset,
            self.align,
            self.reloff,
            self.nreloc,
            self.flags,
            self.reserved1,
            self.reserved2,
        ];
        for v in words {
            bo.put_u32(&mut buf[off..], v);
            off += 4;
        }
        if is_64 {
            bo.put_u32(&mut buf[off..], self.reserved3);
            off += 4;
        }
        off
    }
}

/// Symbol table command plus its decoded symbols.
#[derive(Debug, Clone)]
pub struct Symtab {
    pub len: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
    pub syms: Vec<Symbol>,
}

/// Dynamic symbol table command plus the indirect-symbol indices.
#[derive(Debug, Clone)]
pub struct Dysymtab {
    pub len: u32,
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoffset: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
    pub indirect_syms: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct Dylib {
    pub len: u32,
    pub name: String,
    pub name_offset: u32,
    pub time: u32,
    pub current_version: u32,
    pub compat_version: u32,
}

/// Shared by LC_LOAD_DYLINKER, LC_ID_DYLINKER and LC_DYLD_ENVIRONMENT.
#[derive(Debug, Clone)]
pub struct Dylinker {
    pub cmd: LoadCmd,
    pub len: u32,
    pub name: String,
    pub name_offset: u32,
}

#[derive(Debug, Clone)]
pub struct Rpath {
    pub len: u32,
    pub path: String,
    pub path_offset: u32,
}

/// Shared layout of LC_CODE_SIGNATURE, LC_SEGMENT_SPLIT_INFO,
/// LC_FUNCTION_STARTS, LC_DATA_IN_CODE and LC_DYLIB_CODE_SIGN_DRS.
#[derive(Debug, Clone)]
pub struct LinkEditData {
    pub cmd: LoadCmd,
    pub len: u32,
    pub dataoff: u32,
    pub datasize: u32,
}

/// LC_ENCRYPTION_INFO and LC_ENCRYPTION_INFO_64; the 64-bit form
/// carries a trailing pad word.
#[derive(Debug, Clone)]
pub struct EncryptionInfo {
    pub cmd: LoadCmd,
    pub len: u32,
    pub cryptoff: u32,
    pub cryptlen: u32,
    pub cryptid: u32,
    pub pad: u32,
}

/// LC_DYLD_INFO and LC_DYLD_INFO_ONLY.
#[derive(Debug, Clone)]
pub struct DyldInfo {
    pub cmd: LoadCmd,
    pub len: u32,
    pub rebase_off: u32,
    pub rebase_len: u32,
    pub bind_off: u32,
    pub bind_len: u32,
    pub weak_bind_off: u32,
    pub weak_bind_len: u32,
    pub lazy_bind_off: u32,
    pub lazy_bind_len: u32,
    pub export_off: u32,
    pub export_len: u32,
}

/// Unrecognised command kept as its complete wire form (opcode and
/// length words included) so it can be emitted unchanged.
#[derive(Debug, Clone)]
pub struct RawLoad {
    pub cmd: LoadCmd,
    pub data: Vec<u8>,
}

/// Decoded symbol table entry with its name resolved from the string
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub typ: u8,
    pub sect: u8,
    pub desc: u16,
    pub value: u64,
}

/// Wire-form symbol table entry; `name` is a string-table offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nlist {
    pub name: u32,
    pub typ: u8,
    pub sect: u8,
    pub desc: u16,
    pub value: u64,
}

impl Nlist {
    /// Serialises the entry at the front of `buf` and returns the number
    /// of bytes written: 12 (32-bit) or 16 (64-bit).
    pub fn put(&self, buf: &mut [u8], bo: ByteOrder, is_64: bool) -> usize {
        bo.put_u32(&mut buf[0..], self.name);
        buf[4] = self.typ;
        buf[5] = self.sect;
        bo.put_u16(&mut buf[6..], self.desc);
        if is_64 {
            bo.put_u64(&mut buf[8..], self.value);
            NLIST_SIZE_64 as usize
        } else {
            bo.put_u32(&mut buf[8..], self.value as u32);
            NLIST_SIZE_32 as usize
        }
    }
}

/// Relocation entry. For non-scattered entries `value` is a symbol
/// index when `external` is set and a section index otherwise; for
/// scattered entries it is the target value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reloc {
    pub addr: u32,
    pub value: u32,
    pub typ: u8,
    pub len: u8,
    pub pcrel: bool,
    pub external: bool,
    pub scattered: bool,
}

impl Reloc {
    /// Decodes one 8-byte relocation record from its two words. The
    /// scattered form packs everything into the first word; the plain
    /// form bit-packs the second word differently per byte order.
    #[must_use]
    pub fn decode(addr: u32, info: u32, bo: ByteOrder) -> Reloc {
        if addr & (1 << 31) != 0 {
            return Reloc {
                addr: addr & ((1 << 24) - 1),
                typ: ((addr >> 24) & ((1 << 4) - 1)) as u8,
                len: ((addr >> 28) & ((1 << 2) - 1)) as u8,
                pcrel: addr & (1 << 30) != 0,
                value: info,
                external: false,
                scattered: true,
            };
        }
        match bo {
            ByteOrder::Little => Reloc {
                addr,
                value: info & ((1 << 24) - 1),
                pcrel: info & (1 << 24) != 0,
                len: ((info >> 25) & ((1 << 2) - 1)) as u8,
                external: info & (1 << 27) != 0,
                typ: ((info >> 28) & ((1 << 4) - 1)) as u8,
                scattered: false,
            },
            ByteOrder::Big => Reloc {
                addr,
                value: info >> 8,
                pcrel: info & (1 << 7) != 0,
                len: ((info >> 5) & ((1 << 2) - 1)) as u8,
                external: info & (1 << 4) != 0,
                typ: (info & ((1 << 4) - 1)) as u8,
                scattered: false,
            },
        }
    }
}

fn put_name16(buf: &mut [u8], name: &str) {
    buf[..16].fill(0);
    let bytes = name.as_bytes();
    let n = bytes.len().min(16);
    buf[..n].copy_from_slice(&bytes[..n]);
}

fn put_tail_string(buf: &mut [u8], offset: usize, s: &str) {
    buf[offset..offset + s.len()].copy_from_slice(s.as_bytes());
}
