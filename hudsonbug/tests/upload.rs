use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};

use hudsonbug::test::{Exchange, ScriptedMonitor};
use hudsonbug::upload::{
    upload_image, ImageError, ObjectImage, ProgressEvent, UploadError, UploadProgress,
};
use hudsonbug::{Monitor, MonitorSettings, HUDSONBUG_OPS};
use pretty_assertions::assert_eq;

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const SHDR_SIZE: usize = 40;

const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;
const SHF_WRITE: u32 = 0x1;
const SHF_ALLOC: u32 = 0x2;
const SHF_EXECINSTR: u32 = 0x4;
const PT_LOAD: u32 = 1;

const TEXT: [u8; 3] = [0x12, 0x34, 0x56];
const DATA: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
const COMMENT: &[u8] = b"GCC\0";
const SHSTRTAB: &[u8] = b"\0.text\0.data\0.bss\0.comment\0.shstrtab\0";

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn name_offset(name: &str) -> u32 {
    let needle = format!("{name}\0");
    SHSTRTAB
        .windows(needle.len())
        .position(|window| window == needle.as_bytes())
        .unwrap() as u32
}

/// Builds a big-endian m68k executable.
///
/// `.text` is linked and loaded at 0x1000. `.data` is linked at 0x2000 but loaded at 0x3000,
/// followed by a `.bss`. `.comment` is not allocated.
fn m68k_executable() -> Vec<u8> {
    let text_offset = EHDR_SIZE + 2 * PHDR_SIZE;
    let data_offset = text_offset + 4;
    let comment_offset = data_offset + DATA.len();
    let shstrtab_offset = comment_offset + COMMENT.len();
    let shdr_offset = (shstrtab_offset + SHSTRTAB.len() + 3) & !3;
    let section_count = 6u16;

    let mut out = Vec::new();

    // ELF header
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 2, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    put_u16(&mut out, 2); // ET_EXEC
    put_u16(&mut out, 4); // EM_68K
    put_u32(&mut out, 1);
    put_u32(&mut out, 0x1000); // entry
    put_u32(&mut out, EHDR_SIZE as u32);
    put_u32(&mut out, shdr_offset as u32);
    put_u32(&mut out, 0);
    put_u16(&mut out, EHDR_SIZE as u16);
    put_u16(&mut out, PHDR_SIZE as u16);
    put_u16(&mut out, 2);
    put_u16(&mut out, SHDR_SIZE as u16);
    put_u16(&mut out, section_count);
    put_u16(&mut out, section_count - 1);
    assert_eq!(out.len(), EHDR_SIZE);

    // Program headers
    for (offset, size, vaddr, paddr, memsz) in [
        (text_offset, TEXT.len(), 0x1000, 0x1000, TEXT.len()),
        (data_offset, DATA.len(), 0x2000, 0x3000, DATA.len() + 4),
    ] {
        put_u32(&mut out, PT_LOAD);
        put_u32(&mut out, offset as u32);
        put_u32(&mut out, vaddr);
        put_u32(&mut out, paddr);
        put_u32(&mut out, size as u32);
        put_u32(&mut out, memsz as u32);
        put_u32(&mut out, 0x7);
        put_u32(&mut out, 2);
    }
    assert_eq!(out.len(), text_offset);

    out.extend_from_slice(&TEXT);
    out.push(0);
    out.extend_from_slice(&DATA);
    out.extend_from_slice(COMMENT);
    out.extend_from_slice(SHSTRTAB);
    out.resize(shdr_offset, 0);

    // Section headers: name, type, flags, addr, offset, size
    let sections = [
        (0, 0, 0, 0, 0, 0),
        (
            name_offset(".text"),
            SHT_PROGBITS,
            SHF_ALLOC | SHF_EXECINSTR,
            0x1000,
            text_offset,
            TEXT.len(),
        ),
        (
            name_offset(".data"),
            SHT_PROGBITS,
            SHF_ALLOC | SHF_WRITE,
            0x2000,
            data_offset,
            DATA.len(),
        ),
        (
            name_offset(".bss"),
            SHT_NOBITS,
            SHF_ALLOC | SHF_WRITE,
            0x2004,
            comment_offset,
            4,
        ),
        (
            name_offset(".comment"),
            SHT_PROGBITS,
            0,
            0,
            comment_offset,
            COMMENT.len(),
        ),
        (
            name_offset(".shstrtab"),
            SHT_STRTAB,
            0,
            0,
            shstrtab_offset,
            SHSTRTAB.len(),
        ),
    ];

    for (name, kind, flags, address, offset, size) in sections {
        put_u32(&mut out, name);
        put_u32(&mut out, kind);
        put_u32(&mut out, flags);
        put_u32(&mut out, address);
        put_u32(&mut out, offset as u32);
        put_u32(&mut out, size as u32);
        put_u32(&mut out, 0);
        put_u32(&mut out, 0);
        put_u32(&mut out, 1);
        put_u32(&mut out, 0);
    }

    out
}

fn write_executable(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("program.elf");
    std::fs::write(&path, m68k_executable()).unwrap();
    path
}

/// Behaves like the monitor for the prompt and the edit sub-mode, echoing what it receives.
#[derive(Debug, Default)]
struct SimulatedMonitor {
    memory: BTreeMap<u32, u8>,
    output: VecDeque<u8>,
    line: String,
    edit: Option<u32>,
}

impl SimulatedMonitor {
    fn print(&mut self, text: &str) {
        self.output.extend(text.bytes());
    }

    fn word_at(&self, address: u32) -> u16 {
        let byte = |address| self.memory.get(&address).copied().unwrap_or(0);
        u16::from_be_bytes([byte(address), byte(address.wrapping_add(1))])
    }

    fn print_edit_prompt(&mut self, address: u32) {
        let text = format!("\r\n{:06X} {:04X}:", address, self.word_at(address));
        self.print(&text);
    }

    fn receive(&mut self, byte: u8) {
        match (self.edit, byte) {
            (Some(_), 0x03) => {
                self.edit = None;
                self.line.clear();
                self.print("\r\n+");
            }
            (Some(address), b'\n' | b'\r') => {
                let word = u16::from_str_radix(self.line.trim(), 16).unwrap();
                let [high, low] = word.to_be_bytes();
                self.memory.insert(address, high);
                self.memory.insert(address + 1, low);
                self.line.clear();
                self.edit = Some(address + 2);
                self.print_edit_prompt(address + 2);
            }
            (None, b'\r') => {
                let line = std::mem::take(&mut self.line);
                match line.strip_prefix("e ") {
                    Some(address) => {
                        let address = u32::from_str_radix(address, 16).unwrap();
                        self.edit = Some(address);
                        self.print_edit_prompt(address);
                    }
                    None => self.print("\r\n+"),
                }
            }
            (_, byte) => {
                self.line.push(byte as char);
                self.output.push_back(byte);
            }
        }
    }
}

impl Read for SimulatedMonitor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedMonitor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for byte in buf {
            self.receive(*byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sections_of_the_image() {
    let data = m68k_executable();
    let image = ObjectImage::parse("program.elf".as_ref(), &data).unwrap();

    let sections = image
        .sections()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let loadable: Vec<_> = sections
        .iter()
        .filter(|section| section.is_loadable())
        .map(|section| (section.name(), section.link_address(), section.size()))
        .collect();

    assert_eq!(loadable, vec![(".text", 0x1000, 3), (".data", 0x3000, 4)]);
    assert_eq!(image.entry(), 0x1000);

    // Iterating again starts over.
    assert_eq!(image.sections().count(), sections.len());
}

#[test]
fn scripted_upload() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_executable(&dir);
    let mut monitor = ScriptedMonitor::new();

    let summary = upload_image(
        &mut monitor,
        &HUDSONBUG_OPS,
        &path,
        0x100,
        &UploadProgress::empty(),
    )
    .unwrap();

    assert_eq!(summary.sections, 2);
    assert_eq!(summary.bytes_uploaded, 7);
    assert_eq!(
        monitor.transcript(),
        &[
            Exchange::sent("e 1100\r"),
            Exchange::expected(":"),
            Exchange::sent("1234\n"),
            Exchange::expected(":"),
            Exchange::sent("5600\n"),
            Exchange::expected(":"),
            Exchange::sent("\x03"),
            Exchange::prompt(),
            Exchange::sent("e 3100\r"),
            Exchange::expected(":"),
            Exchange::sent("dead\n"),
            Exchange::expected(":"),
            Exchange::sent("beef\n"),
            Exchange::expected(":"),
            Exchange::sent("\x03"),
            Exchange::prompt(),
        ]
    );
}

#[test]
fn upload_through_the_monitor_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_executable(&dir);

    let mut monitor =
        Monitor::open(SimulatedMonitor::default(), &HUDSONBUG_OPS, MonitorSettings::default())
            .unwrap();

    let started = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = started.clone();
    let progress = UploadProgress::new(move |event| {
        if let ProgressEvent::SectionStarted { name, size, address } = event {
            sink.borrow_mut().push(format!(
                "Loading section {name}, size {size:#x}, lma {address:#x}"
            ));
        }
    });

    let summary =
        upload_image(&mut monitor, &HUDSONBUG_OPS, &path, 0x00f0_0000, &progress).unwrap();
    assert_eq!(summary.bytes_uploaded, 7);

    assert_eq!(
        *started.borrow(),
        vec![
            "Loading section .text, size 0x3, lma 0xf01000",
            "Loading section .data, size 0x4, lma 0xf03000",
        ]
    );

    let target = monitor.into_inner();
    let memory: Vec<_> = target.memory.into_iter().collect();
    assert_eq!(
        memory,
        vec![
            (0x00f0_1000, 0x12),
            (0x00f0_1001, 0x34),
            (0x00f0_1002, 0x56),
            (0x00f0_1003, 0x00),
            (0x00f0_3000, 0xde),
            (0x00f0_3001, 0xad),
            (0x00f0_3002, 0xbe),
            (0x00f0_3003, 0xef),
        ]
    );
    assert!(target.edit.is_none());
}

#[test]
fn memory_write_through_the_monitor_engine() {
    let mut monitor =
        Monitor::open(SimulatedMonitor::default(), &HUDSONBUG_OPS, MonitorSettings::default())
            .unwrap();

    monitor.write_memory(0x2000, &[0x4e, 0x71, 0x4e, 0x75]).unwrap();

    let target = monitor.into_inner();
    assert_eq!(target.word_at(0x2000), 0x4e71);
    assert_eq!(target.word_at(0x2002), 0x4e75);
}

#[test]
fn not_an_object_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "this is not a program").unwrap();
    let mut monitor = ScriptedMonitor::new();

    let err = upload_image(
        &mut monitor,
        &HUDSONBUG_OPS,
        &path,
        0,
        &UploadProgress::empty(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Image(ImageError::NotAnObject { .. })
    ));
    assert!(monitor.transcript().is_empty());
}
