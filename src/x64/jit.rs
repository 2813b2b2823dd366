//! Executable mapping of assembled harness functions.

use crate::core::backend::EntryPoint;
use crate::core::error::{CodegenError, CodegenResult};
use memmap2::{Mmap, MmapMut};

fn jit_error(err: std::io::Error) -> CodegenError {
    CodegenError::Jit {
        reason: err.to_string(),
    }
}

/// Machine code mapped read-execute, callable as an [`EntryPoint`].
pub struct JitCode {
    code: Mmap,
}

impl JitCode {
    /// Copy `bytes` into a fresh anonymous mapping and make it executable.
    pub fn new(bytes: &[u8]) -> CodegenResult<Self> {
        if bytes.is_empty() {
            return Err(CodegenError::Jit {
                reason: "no code to map".to_string(),
            });
        }
        let mut map = MmapMut::map_anon(bytes.len()).map_err(jit_error)?;
        map.copy_from_slice(bytes);
        let code = map.make_exec().map_err(jit_error)?;
        Ok(Self { code })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn entry(&self) -> EntryPoint {
        // SAFETY: the mapping holds a complete function assembled for the
        // harness signature and lives as long as `self`.
        unsafe { std::mem::transmute::<*const u8, EntryPoint>(self.code.as_ptr()) }
    }

    /// Call the function with three pointer arguments.
    ///
    /// # Safety
    ///
    /// Every pointer must be valid for all accesses the generated code makes
    /// through it.
    pub unsafe fn call(&self, arg0: *mut u8, arg1: *mut u8, arg2: *mut u8) -> u64 {
        (self.entry())(arg0, arg1, arg2)
    }
}

impl std::fmt::Debug for JitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitCode")
            .field("address", &self.code.as_ptr())
            .field("len", &self.code.len())
            .finish()
    }
}

#[cfg(all(test, target_arch = "x86_64", unix))]
mod tests {
    use super::JitCode;

    #[test]
    fn test_exec() {
        let ret_code: u8 = 0x2c;
        let instructions: [u8; 6] = [
            0xb8, ret_code, 0x00, 0x00, 0x00, // mov eax, 0x2c
            0xc3, // ret
        ];
        let jit = JitCode::new(&instructions).unwrap();
        let result = unsafe { jit.call(std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut()) };

        assert_eq!(result, u64::from(ret_code));
        assert_eq!(jit.as_bytes(), &instructions);
    }

    #[test]
    fn test_empty_code_rejected() {
        assert!(JitCode::new(&[]).is_err());
    }
}
