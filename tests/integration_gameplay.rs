//! End-to-end scenarios driven through `Interpreter` itself rather than individual module APIs:
//! a full call/return cycle, `sread`/`aread` suspend-then-resume, and a save/restore round trip
//! through both the branch-form (V1-3) and store-form (V4) encodings.

use zorkwright::interpreter::ExecutionState;
use zorkwright::io_channel::HeadlessIoChannel;
use zorkwright::{InterpreterConfig, Interpreter, Memory, Vm};

const GLOBALS_ADDR: u16 = 0x40;
const CODE_START: u16 = 0x200;

/// Appends bytecode to a story image at a fixed offset, handing back the address of whatever it
/// just wrote so callers can compute branch targets without repeating arithmetic by hand.
struct Image {
    bytes: Vec<u8>,
}

impl Image {
    fn new(version: u8) -> Image {
        // Exactly `CODE_START` bytes so the first `push`/`push_all` lands at `CODE_START`,
        // matching the header's `initial_pc`; anything below that (globals, dictionary) is
        // filled in afterwards with `write_at`.
        let mut bytes = vec![0u8; CODE_START as usize];
        bytes[0x00] = version;
        bytes[0x06] = (CODE_START >> 8) as u8;
        bytes[0x07] = (CODE_START & 0xFF) as u8;
        bytes[0x0C] = (GLOBALS_ADDR >> 8) as u8;
        bytes[0x0D] = (GLOBALS_ADDR & 0xFF) as u8;
        // Static memory starts where code does, so Quetzal's dynamic-memory snapshot (everything
        // below this address) actually covers the globals table these tests mutate.
        bytes[0x0E] = (CODE_START >> 8) as u8;
        bytes[0x0F] = (CODE_START & 0xFF) as u8;
        Image { bytes }
    }

    fn set_dictionary(&mut self, addr: u16) {
        self.bytes[0x08] = (addr >> 8) as u8;
        self.bytes[0x09] = (addr & 0xFF) as u8;
    }

    fn push(&mut self, byte: u8) -> u16 {
        let addr = self.bytes.len() as u16;
        self.bytes.push(byte);
        addr
    }

    fn push_all(&mut self, bytes: &[u8]) -> u16 {
        let addr = self.bytes.len() as u16;
        self.bytes.extend_from_slice(bytes);
        addr
    }

    fn write_at(&mut self, addr: u16, bytes: &[u8]) {
        let addr = addr as usize;
        self.bytes[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    /// `store <variable> <value>` (2OP 0x0D, long form, both operands small constants).
    fn store_global(&mut self, global: u8, value: u8) {
        self.push_all(&[0x0D, global, value]);
    }

    /// `quit` (short 0OP 0x0A).
    fn quit(&mut self) {
        self.push(0xBA);
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

fn interpreter_for(image: Vec<u8>) -> Interpreter<HeadlessIoChannel> {
    let memory = Memory::new(image).unwrap();
    let vm = Vm::new(memory, &InterpreterConfig::default());
    Interpreter::new(vm, HeadlessIoChannel::new())
}

#[test]
fn call_and_ret_round_trip_store_result_in_global() {
    let mut image = Image::new(3);

    // Placeholder for the call instruction; routine address filled in once we know where the
    // routine itself lands (we lay the routine out right after the main code).
    let call_site = image.push_all(&[0xE0, 0x3F, 0x00, 0x00, 0x10]); // call <routine> -> G10
    image.quit();

    // Routine: 0 locals, `ret 42`.
    let routine_addr = image.push(0x00); // num_locals = 0
    image.push_all(&[0x9B, 42]); // ret #42 (short 1OP, small-constant operand)

    let packed = routine_addr / 2; // V1-3 packing
    image.write_at(call_site + 2, &packed.to_be_bytes());

    let bytes = image.finish();
    let mut interp = interpreter_for(bytes);

    loop {
        match interp.step().unwrap() {
            ExecutionState::Running => continue,
            ExecutionState::Quit => break,
            other => panic!("unexpected suspension: {other:?}"),
        }
    }

    assert_eq!(interp.vm.memory.global(0x10).unwrap(), 42);
}

#[test]
fn sread_suspends_and_resumes_with_tokenized_input() {
    let mut image = Image::new(3);
    image.set_dictionary(0x50);

    // Dictionary: no separators, one 7-byte entry ("cat", v1-3 encodes 2 words per entry).
    image.write_at(0x50, &[0]); // separator count
    image.write_at(0x51, &[7]); // entry length
    image.write_at(0x52, &1u16.to_be_bytes()); // entry count
    let zchars = zorkwright::text::encode_zchars("cat", 6);
    let packed = zorkwright::text::pack_zchars(&zchars);
    image.write_at(0x54, &packed[0].to_be_bytes());
    image.write_at(0x56, &packed[1].to_be_bytes());

    let text_buffer: u16 = 0x100;
    let parse_buffer: u16 = 0x120;
    image.write_at(text_buffer, &[32]); // max input length
    image.write_at(parse_buffer, &[8]); // max tokens

    // sread text_buffer parse_buffer (VAR form, two large-constant operands).
    image.push(0xE4);
    image.push(0x0F); // type byte: two large constants, rest omitted
    image.push_all(&text_buffer.to_be_bytes());
    image.push_all(&parse_buffer.to_be_bytes());
    image.quit();

    let bytes = image.finish();
    let mut interp = interpreter_for(bytes);

    let state = interp.step().unwrap();
    let (tb, pb) = match state {
        ExecutionState::AwaitingInput {
            text_buffer,
            parse_buffer,
        } => (text_buffer, parse_buffer),
        other => panic!("expected AwaitingInput, got {other:?}"),
    };
    assert_eq!(tb, text_buffer as u32);
    assert_eq!(pb, parse_buffer as u32);

    let state = interp.submit_input("cat").unwrap();
    assert_eq!(state, ExecutionState::Running);

    let token_count = interp.vm.memory.load_byte(parse_buffer as u32 + 1).unwrap();
    assert_eq!(token_count, 1);
    let dict_addr = interp.vm.memory.load_word(parse_buffer as u32 + 2).unwrap();
    assert_ne!(dict_addr, 0, "known word should resolve to a dictionary entry");

    let state = interp.step().unwrap();
    assert_eq!(state, ExecutionState::Quit);
}

#[test]
fn save_then_restore_round_trip_branch_form_v3() {
    let mut image = Image::new(3);

    image.store_global(0x10, 111); // checkpoint value

    // save (short 0OP 0x05) with a single-byte branch: on_true, offset 2 (a no-op jump, lands
    // right after the branch byte either way).
    image.push_all(&[0xB5, 0xC2]);

    image.store_global(0x10, 222); // mutated after the save point

    image.push_all(&[0xB6, 0xC2]); // restore, same branch encoding

    image.quit();

    let bytes = image.finish();
    let mut interp = interpreter_for(bytes);

    assert_eq!(interp.step().unwrap(), ExecutionState::Running); // store 111
    let save_state = interp.step().unwrap();
    let save_bytes = match save_state {
        ExecutionState::AwaitingSave { bytes } => bytes,
        other => panic!("expected AwaitingSave, got {other:?}"),
    };
    assert_eq!(interp.submit_save_result(true).unwrap(), ExecutionState::Running);

    assert_eq!(interp.step().unwrap(), ExecutionState::Running); // store 222
    assert_eq!(interp.vm.memory.global(0x10).unwrap(), 222);

    let restore_state = interp.step().unwrap();
    assert_eq!(restore_state, ExecutionState::AwaitingRestore);
    let resumed = interp.submit_restore_result(Some(save_bytes)).unwrap();
    assert_eq!(resumed, ExecutionState::Running);

    // The dynamic-memory snapshot from the save point reverts the post-save mutation, and
    // execution resumes at the instruction right after `save`'s own branch bytes (0x203-0x204),
    // not at `restore`'s continuation.
    assert_eq!(interp.vm.memory.global(0x10).unwrap(), 111);
    assert_eq!(interp.vm.pc, 0x205);
}

#[test]
fn save_then_restore_round_trip_store_form_v4() {
    let mut image = Image::new(4);

    image.store_global(0x10, 111); // checkpoint value

    // save (short 0OP 0x05) is store-form in V4: one store-result byte, no branch.
    image.push_all(&[0xB5, 0x11]); // save -> G11 (did-it-succeed flag)

    let resume_target = image.bytes.len() as u16;
    image.store_global(0x10, 222); // mutated after the save point

    image.push_all(&[0xB6, 0x12]); // restore -> G12 (unused on success)
    image.quit();

    let bytes = image.finish();
    let mut interp = interpreter_for(bytes);

    assert_eq!(interp.step().unwrap(), ExecutionState::Running); // store 111
    let save_state = interp.step().unwrap();
    let save_bytes = match save_state {
        ExecutionState::AwaitingSave { bytes } => bytes,
        other => panic!("expected AwaitingSave, got {other:?}"),
    };
    assert_eq!(interp.submit_save_result(true).unwrap(), ExecutionState::Running);
    assert_eq!(interp.vm.memory.global(0x11).unwrap(), 1);

    assert_eq!(interp.step().unwrap(), ExecutionState::Running); // store 222
    assert_eq!(interp.vm.memory.global(0x10).unwrap(), 222);

    let restore_state = interp.step().unwrap();
    assert_eq!(restore_state, ExecutionState::AwaitingRestore);
    let resumed = interp.submit_restore_result(Some(save_bytes)).unwrap();
    assert_eq!(resumed, ExecutionState::Running);

    // Restore reverts dynamic memory to the save-time snapshot, resumes right where `save`
    // itself left off, and writes 2 into *save's* own result variable (G11), not restore's.
    assert_eq!(interp.vm.memory.global(0x10).unwrap(), 111);
    assert_eq!(interp.vm.memory.global(0x11).unwrap(), 2);
    assert_eq!(interp.vm.pc, resume_target as u32);
}
