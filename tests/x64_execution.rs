//! Execution tests for the x64 backend.
//!
//! Every test generates a harness function, maps it executable and runs it
//! on host buffers, then checks both the result and the emitted instruction
//! mix.

#![cfg(all(target_arch = "x86_64", unix))]

use std::fmt::Debug;
use typed_codegen::core::{Backend, CodegenResult};
use typed_codegen::{
    make_vector, CodegenError, EmissionStats, JitCode, NarrowerThan, Ptr, Scalar, ShiftableLane,
    Value, Vector, VectorShape, X64Backend,
};

fn compile<F>(build: F) -> (JitCode, EmissionStats)
where
    F: FnOnce(&X64Backend) -> CodegenResult<()>,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = X64Backend::new().unwrap();
    build(&backend).unwrap();
    let stats = backend.stats();
    (backend.finalize().unwrap(), stats)
}

fn run(jit: &JitCode, arg0: *mut u8, arg1: *mut u8) -> u64 {
    unsafe { jit.call(arg0, arg1, std::ptr::null_mut()) }
}

fn ptr<T>(value: &mut T) -> *mut u8 {
    (value as *mut T).cast()
}

fn has_avx2() -> bool {
    std::arch::is_x86_feature_detected!("avx2")
}

fn round_trip<T>(input: T)
where
    T: Scalar + Copy + Default + PartialEq + Debug,
{
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, T>::arg(backend, 0)?;
        let dst = Ptr::<_, T>::arg(backend, 1)?;
        let mut value = Value::<_, T>::new(backend, "value")?;
        value.assign(&src.deref())?;
        value.store_to(&dst.deref())?;
        value.ret()
    });

    let mut src = input;
    let mut dst = T::default();
    run(&jit, ptr(&mut src), ptr(&mut dst));
    assert_eq!(dst, input, "{} round trip", T::TYPE);
    assert_eq!(stats.registers_allocated, 1);
    assert_eq!(stats.registers_released, 1);
}

#[test]
fn test_store_load_round_trip() {
    round_trip(0xA5u8);
    round_trip(-91i8);
    round_trip(0xBEEFu16);
    round_trip(-12345i16);
    round_trip(0xDEAD_BEEFu32);
    round_trip(-123_456_789i32);
    round_trip(0x0123_4567_89AB_CDEFu64);
    round_trip(i64::MIN + 17);
}

#[test]
fn test_return_zero_extends() {
    let (jit, _) = compile(|backend| Value::<_, i8>::with_value(backend, -1, "v")?.ret());
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 0xFF);

    let (jit, _) = compile(|backend| Value::<_, i32>::with_value(backend, -1, "v")?.ret());
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 0xFFFF_FFFF);

    let (jit, _) = compile(|backend| Value::<_, i64>::with_value(backend, -1, "v")?.ret());
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), u64::MAX);
}

#[test]
fn test_add_wraparound() {
    let (jit, stats) = compile(|backend| {
        let mut x = Value::<_, u8>::with_value(backend, 250, "x")?;
        x.add_assign(10u8)?;
        x.ret()
    });
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 4);
    assert_eq!(stats.count("add"), 1);

    let (jit, _) = compile(|backend| {
        let dst = Ptr::<_, i16>::arg(backend, 0)?;
        let mut x = Value::<_, i16>::with_value(backend, i16::MAX, "x")?;
        x.add_assign(1i16)?;
        x.store_to(&dst.deref())?;
        x.ret()
    });
    let mut out = 0i16;
    run(&jit, ptr(&mut out), std::ptr::null_mut());
    assert_eq!(out, i16::MIN);

    let (jit, _) = compile(|backend| {
        let mut x = Value::<_, u32>::with_value(backend, 0, "x")?;
        x.sub_assign(1u32)?;
        x.ret()
    });
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 0xFFFF_FFFF);
}

#[test]
fn test_logic_with_memory_operands() {
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, u16>::arg(backend, 0)?;
        let mut x = Value::<_, u16>::with_value(backend, 0xFF00, "x")?;
        x.or_assign(&src.at(0)?)?;
        x.and_assign(&src.at(1)?)?;
        x.xor_assign(&src.at(2)?)?;
        x.ret()
    });

    let mut src: [u16; 3] = [0x00F0, 0x0FFF, 0x0101];
    let result = run(&jit, src.as_mut_ptr().cast(), std::ptr::null_mut());
    assert_eq!(result, ((0xFF00 | 0x00F0) & 0x0FFF) ^ 0x0101);
    assert_eq!(stats.count("or"), 1);
    assert_eq!(stats.count("and"), 1);
    assert_eq!(stats.count("xor"), 1);
}

#[test]
fn test_value_operands_copy() {
    let (jit, _) = compile(|backend| {
        let mut a = Value::<_, u64>::with_value(backend, 40, "a")?;
        let mut b = Value::<_, u64>::new(backend, "b")?;
        b.assign(&a)?;
        // b is a copy, later changes to a do not reach it
        a.add_assign(1000u64)?;
        b.add_assign(&a)?;
        b.add_assign(3u64)?;
        b.ret()
    });
    // 40 + 1040 + 3
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 1083);
}

#[test]
fn test_narrow_truncates() {
    let (jit, _) = compile(|backend| {
        let src = Ptr::<_, u64>::arg(backend, 0)?;
        let dst = Ptr::<_, u8>::arg(backend, 1)?;
        let mut wide = Value::<_, u64>::new(backend, "wide")?;
        wide.assign(&src.deref())?;
        let mut narrow = Value::<_, u8>::new(backend, "narrow")?;
        narrow.narrow(&wide)?;
        narrow.store_to(&dst.deref())?;
        narrow.ret()
    });
    let mut src = 0x1122_3344_5566_7788u64;
    let mut dst = 0u8;
    assert_eq!(run(&jit, ptr(&mut src), ptr(&mut dst)), 0x88);
    assert_eq!(dst, 0x88);

    let (jit, _) = compile(|backend| {
        let src = Ptr::<_, i64>::arg(backend, 0)?;
        let dst = Ptr::<_, i16>::arg(backend, 1)?;
        let mut wide = Value::<_, i64>::new(backend, "wide")?;
        wide.assign(&src.deref())?;
        let mut narrow = Value::<_, i16>::new(backend, "narrow")?;
        narrow.narrow(&wide)?;
        narrow.store_to(&dst.deref())?;
        narrow.ret()
    });
    let mut src = -2i64;
    let mut dst = 0i16;
    run(&jit, ptr(&mut src), ptr(&mut dst));
    assert_eq!(dst, -2);

    let (jit, _) = compile(|backend| {
        let wide = Value::<_, u32>::with_value(backend, 0x0001_2345, "wide")?;
        let mut narrow = Value::<_, u16>::new(backend, "narrow")?;
        narrow.narrow(&wide)?;
        narrow.ret()
    });
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 0x2345);
}

fn widen<S, D>(input: S) -> (D, EmissionStats)
where
    S: Scalar + NarrowerThan<D> + Copy,
    D: Scalar + Copy + Default,
{
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, S>::arg(backend, 0)?;
        let dst = Ptr::<_, D>::arg(backend, 1)?;
        let mut narrow = Value::<_, S>::new(backend, "narrow")?;
        narrow.assign(&src.deref())?;
        let mut wide = Value::<_, D>::new(backend, "wide")?;
        wide.widen(&narrow)?;
        wide.store_to(&dst.deref())?;
        wide.ret()
    });
    let mut src = input;
    let mut dst = D::default();
    run(&jit, ptr(&mut src), ptr(&mut dst));
    (dst, stats)
}

macro_rules! widen_cases {
    ($($src:ty => $dst:ty: $input:expr => $expected:expr;)*) => {
        $(
            let (result, stats) = widen::<$src, $dst>($input);
            assert_eq!(
                result,
                $expected,
                "{} -> {}",
                stringify!($src),
                stringify!($dst)
            );
            if <$dst as Scalar>::TYPE.signed {
                assert_eq!(stats.count("movsx") + stats.count("movsxd"), 1);
            } else {
                assert_eq!(stats.count("movsx") + stats.count("movsxd"), 0);
            }
        )*
    };
}

#[test]
fn test_widen_every_pair() {
    // extension follows the destination signedness
    widen_cases! {
        u8 => u16: 0x85 => 0x85;
        u8 => i16: 0x85 => -123;
        u8 => u32: 0x85 => 0x85;
        u8 => i32: 0x85 => -123;
        u8 => u64: 0x85 => 0x85;
        u8 => i64: 0x85 => -123;
        i8 => u16: -123 => 0x85;
        i8 => i16: -123 => -123;
        i8 => u32: -123 => 0x85;
        i8 => i32: -123 => -123;
        i8 => u64: -123 => 0x85;
        i8 => i64: -123 => -123;
        u16 => u32: 0x8001 => 0x8001;
        u16 => i32: 0x8001 => -32767;
        u16 => u64: 0x8001 => 0x8001;
        u16 => i64: 0x8001 => -32767;
        i16 => u32: -32767 => 0x8001;
        i16 => i32: -32767 => -32767;
        i16 => u64: -32767 => 0x8001;
        i16 => i64: -32767 => -32767;
        u32 => u64: 0x8000_0002 => 0x8000_0002;
        u32 => i64: 0x8000_0002 => -2_147_483_646;
        i32 => u64: -2_147_483_646 => 0x8000_0002;
        i32 => i64: -2_147_483_646 => -2_147_483_646;
    }
}

#[test]
fn test_scalar_scenario() {
    let (jit, stats) = compile(|backend| {
        let mut x = Value::<_, u32>::with_value(backend, 10, "x")?;
        x.add_assign(5u32)?;
        x.shr_assign(1u32)?;
        x.div_assign(2)?;
        x.ret()
    });
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 3);
    assert_eq!(stats.count("shr"), 2);
    assert_eq!(stats.count("div"), 0);
    assert_eq!(stats.count("idiv"), 0);
}

#[test]
fn test_signed_shift_and_division() {
    let (jit, stats) = compile(|backend| {
        let mut x = Value::<_, i32>::with_value(backend, -64, "x")?;
        x.shr_assign(2u32)?;
        x.div_assign(4)?;
        x.shl_assign(1u32)?;
        let dst = Ptr::<_, i32>::arg(backend, 0)?;
        x.store_to(&dst.deref())?;
        x.ret()
    });
    let mut out = 0i32;
    run(&jit, ptr(&mut out), std::ptr::null_mut());
    assert_eq!(out, -8);
    assert_eq!(stats.count("sar"), 2);
    assert_eq!(stats.count("shr"), 0);
    assert_eq!(stats.count("shl"), 1);
}

#[test]
fn test_register_shift_amount() {
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, u64>::arg(backend, 0)?;
        let mut amount = Value::<_, u64>::new(backend, "amount")?;
        amount.assign(&src.deref())?;
        let mut x = Value::<_, u64>::with_value(backend, 3, "x")?;
        x.shl_assign(&amount)?;
        x.ret()
    });
    let mut amount = 40u64;
    assert_eq!(run(&jit, ptr(&mut amount), std::ptr::null_mut()), 3 << 40);
    assert_eq!(stats.count("shl"), 1);
}

#[test]
fn test_division_rejection_emits_nothing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = X64Backend::new().unwrap();
    let mut x = Value::<_, u32>::with_value(&backend, 10, "x").unwrap();
    let before = backend.stats().instructions_emitted;

    assert_eq!(
        x.div_assign(6).err(),
        Some(CodegenError::UnsupportedDivisor { divisor: 6 })
    );
    assert!(x.div_assign(0).is_err());
    assert_eq!(backend.stats().instructions_emitted, before);

    let mut y = Value::<_, i16>::new(&backend, "y").unwrap();
    let before = backend.stats().instructions_emitted;
    assert_eq!(
        y.div_assign(-2).err(),
        Some(CodegenError::UnsupportedDivisor { divisor: -2 })
    );
    assert!(y.shr_assign(16u32).is_err());
    assert_eq!(backend.stats().instructions_emitted, before);
}

#[test]
fn test_unsigned_comparison() {
    let (jit, stats) = compile(|backend| {
        let x = Value::<_, u32>::with_value(backend, 1, "x")?;
        let mut below = Value::<_, u8>::new(backend, "below")?;
        // signed, 0xFFFF_FFFF would be -1 and the test false
        x.cmp_lt(0xFFFF_FFFFu32).materialize(&mut below)?;
        below.ret()
    });
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 1);
    assert_eq!(stats.count("setb"), 1);
    assert_eq!(stats.count("setl"), 0);

    let (jit, stats) = compile(|backend| {
        let x = Value::<_, i32>::with_value(backend, -1, "x")?;
        let mut less = Value::<_, u8>::new(backend, "less")?;
        x.cmp_lt(1i32).materialize(&mut less)?;
        less.ret()
    });
    assert_eq!(run(&jit, std::ptr::null_mut(), std::ptr::null_mut()), 1);
    assert_eq!(stats.count("setl"), 1);
}

#[test]
fn test_comparison_operand_forms() {
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, u64>::arg(backend, 0)?;
        let x = Value::<_, u64>::with_value(backend, 0x1_0000_0000, "x")?;
        let y = Value::<_, u64>::with_value(backend, 7, "y")?;
        let mut acc = Value::<_, u8>::with_value(backend, 0, "acc")?;
        let mut bit = Value::<_, u8>::new(backend, "bit")?;

        x.cmp_eq(0x1_0000_0000u64).materialize(&mut bit)?;
        acc.add_assign(&bit)?.shl_assign(1u32)?;
        x.cmp_gt(&y).materialize(&mut bit)?;
        acc.add_assign(&bit)?.shl_assign(1u32)?;
        y.cmp_ge(&src.deref()).materialize(&mut bit)?;
        acc.add_assign(&bit)?.shl_assign(1u32)?;
        y.cmp_eq(7u64).negate().materialize(&mut bit)?;
        acc.add_assign(&bit)?;
        acc.ret()
    });
    let mut bound = 8u64;
    // eq, gt hold; 7 >= 8 and !(7 == 7) do not
    assert_eq!(run(&jit, ptr(&mut bound), std::ptr::null_mut()), 0b1100);
    assert_eq!(stats.count("cmp"), 4);
    assert_eq!(stats.count("sete"), 1);
    assert_eq!(stats.count("seta"), 1);
    assert_eq!(stats.count("setae"), 1);
    assert_eq!(stats.count("setne"), 1);
}

#[test]
fn test_pointer_indexing() {
    let (jit, _) = compile(|backend| {
        let table = Ptr::<_, u32>::arg(backend, 0)?;
        let index_src = Ptr::<_, u64>::arg(backend, 1)?;
        let mut index = Value::<_, u64>::new(backend, "index")?;
        index.assign(&index_src.deref())?;

        let mut x = Value::<_, u32>::new(backend, "x")?;
        x.assign(&table.index(&index))?;
        x.add_assign(&table.at(3)?)?;
        x.ret()
    });
    let mut table: [u32; 4] = [10, 20, 30, 40];
    let mut index = 2u64;
    assert_eq!(run(&jit, table.as_mut_ptr().cast(), ptr(&mut index)), 70);

    let _ = env_logger::builder().is_test(true).try_init();
    let backend = X64Backend::new().unwrap();
    let table = Ptr::<_, u64>::arg(&backend, 0).unwrap();
    assert!(matches!(
        table.at(i64::MAX),
        Err(CodegenError::DisplacementOverflow { .. })
    ));
    assert_eq!(table.at(-1).unwrap().mem().disp, -8);
    assert_eq!(table.cast::<u16>().at(3).unwrap().size_tag(), Some(2));
}

fn vector_round_trip<T, const N: usize>(input: [T; N])
where
    T: Scalar + Copy + PartialEq + Debug,
    [T; N]: VectorShape,
{
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, T>::arg(backend, 0)?;
        let dst = Ptr::<_, T>::arg(backend, 1)?;
        let mut src_ref = src.deref();
        let vector: Vector<_, T, N> = make_vector(backend, &mut src_ref)?;
        assert_eq!(src_ref.size_tag(), Some((N * std::mem::size_of::<T>()) as u8));
        vector.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, vector.width() as u64, "lanes")?.ret()
    });

    let bytes = N * std::mem::size_of::<T>();
    // one byte past an aligned start, so both accesses are unaligned
    let mut src = vec![0u8; bytes + 1];
    let mut dst = vec![0u8; bytes + 1];
    let src_ptr = unsafe { src.as_mut_ptr().add(1) };
    let dst_ptr = unsafe { dst.as_mut_ptr().add(1) };
    unsafe { std::ptr::write_unaligned(src_ptr.cast::<[T; N]>(), input) };

    assert_eq!(run(&jit, src_ptr, dst_ptr), N as u64);
    let output = unsafe { std::ptr::read_unaligned(dst_ptr.cast::<[T; N]>()) };
    assert_eq!(output, input, "{}x{} round trip", T::TYPE, N);

    if bytes == 16 {
        assert_eq!(stats.count("movdqu"), 2);
        assert_eq!(stats.count("vzeroupper"), 0);
    } else {
        assert_eq!(stats.count("vmovdqu"), 2);
        assert_eq!(stats.count("vzeroupper"), 1);
    }
    assert_eq!(stats.vector_registers_allocated, 1);
}

#[test]
fn test_vector_round_trip_128() {
    vector_round_trip::<u8, 16>(std::array::from_fn(|i| (i as u8).wrapping_mul(37)));
    vector_round_trip::<i16, 8>(std::array::from_fn(|i| -(i as i16) * 1000));
    vector_round_trip::<u32, 4>(std::array::from_fn(|i| 0xF000_0000 | i as u32));
    vector_round_trip::<i64, 2>([i64::MIN, i64::MAX]);
}

#[test]
fn test_vector_round_trip_256() {
    if !has_avx2() {
        return;
    }
    vector_round_trip::<i8, 32>(std::array::from_fn(|i| i as i8 - 16));
    vector_round_trip::<u16, 16>(std::array::from_fn(|i| (i as u16) << 12));
    vector_round_trip::<i32, 8>(std::array::from_fn(|i| i as i32 * -77_777));
    vector_round_trip::<u64, 4>(std::array::from_fn(|i| u64::MAX - i as u64));
}

#[test]
fn test_vector_add() {
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, u32>::arg(backend, 0)?;
        let dst = Ptr::<_, u32>::arg(backend, 1)?;
        let mut sum: Vector<_, u32, 4> = make_vector(backend, &mut src.deref())?;
        sum.add_assign(&mut src.at(4)?)?;
        sum.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });
    let mut src: [u32; 8] = [1, 2, 3, u32::MAX, 10, 20, 30, 2];
    let mut dst = [0u32; 4];
    run(&jit, src.as_mut_ptr().cast(), dst.as_mut_ptr().cast());
    assert_eq!(dst, [11, 22, 33, 1]);
    assert_eq!(stats.count("paddd"), 1);

    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, i16>::arg(backend, 0)?;
        let dst = Ptr::<_, i16>::arg(backend, 1)?;
        let mut a: Vector<_, i16, 8> = make_vector(backend, &mut src.deref())?;
        let b: Vector<_, i16, 8> = make_vector(backend, &mut src.at(8)?)?;
        a.add_assign(&b)?;
        a.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });
    let mut src: [i16; 16] = std::array::from_fn(|i| if i < 8 { i16::MAX } else { i as i16 - 8 });
    let mut dst = [0i16; 8];
    run(&jit, src.as_mut_ptr().cast(), dst.as_mut_ptr().cast());
    let expected: [i16; 8] = std::array::from_fn(|i| i16::MAX.wrapping_add(i as i16));
    assert_eq!(dst, expected);
    assert_eq!(stats.count("paddw"), 1);
    assert_eq!(stats.vector_registers_allocated, 2);
}

#[test]
fn test_vector_add_256() {
    if !has_avx2() {
        return;
    }
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, u64>::arg(backend, 0)?;
        let dst = Ptr::<_, u64>::arg(backend, 1)?;
        let mut sum: Vector<_, u64, 4> = make_vector(backend, &mut src.deref())?;
        sum.add_assign(&mut src.at(4)?)?;
        sum.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });
    let mut src: [u64; 8] = [1, 2, 3, u64::MAX, 100, 200, 300, 1];
    let mut dst = [0u64; 4];
    run(&jit, src.as_mut_ptr().cast(), dst.as_mut_ptr().cast());
    assert_eq!(dst, [101, 202, 303, 0]);
    assert_eq!(stats.count("vpaddq"), 1);
}

#[test]
fn test_vector_shift_is_logical() {
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, i32>::arg(backend, 0)?;
        let dst = Ptr::<_, i32>::arg(backend, 1)?;
        let mut v: Vector<_, i32, 4> = make_vector(backend, &mut src.deref())?;
        v.shr_assign(1)?;
        v.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });
    let mut src: [i32; 4] = [-8, 16, -1, 7];
    let mut dst = [0i32; 4];
    run(&jit, src.as_mut_ptr().cast(), dst.as_mut_ptr().cast());
    assert_eq!(dst, [0x7FFF_FFFC, 8, 0x7FFF_FFFF, 3]);
    assert_eq!(stats.count("psrld"), 1);

    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, u64>::arg(backend, 0)?;
        let dst = Ptr::<_, u64>::arg(backend, 1)?;
        let mut v: Vector<_, u64, 2> = make_vector(backend, &mut src.deref())?;
        v.div_assign(16)?;
        v.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });
    let mut src: [u64; 2] = [0x100, u64::MAX];
    let mut dst = [0u64; 2];
    run(&jit, src.as_mut_ptr().cast(), dst.as_mut_ptr().cast());
    assert_eq!(dst, [0x10, u64::MAX >> 4]);
    assert_eq!(stats.count("psrlq"), 1);
}

#[test]
fn test_vector_shift_256() {
    if !has_avx2() {
        return;
    }
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, i16>::arg(backend, 0)?;
        let dst = Ptr::<_, i16>::arg(backend, 1)?;
        let mut v: Vector<_, i16, 16> = make_vector(backend, &mut src.deref())?;
        v.shr_assign(15)?;
        v.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });
    let mut src: [i16; 16] = std::array::from_fn(|i| if i % 2 == 0 { -1 } else { 1 });
    let mut dst = [0i16; 16];
    run(&jit, src.as_mut_ptr().cast(), dst.as_mut_ptr().cast());
    let expected: [i16; 16] = std::array::from_fn(|i| if i % 2 == 0 { 1 } else { 0 });
    assert_eq!(dst, expected);
    assert_eq!(stats.count("vpsrlw"), 1);
    assert_eq!(stats.count("vzeroupper"), 1);
}

/// Lanes of `a` and `b` at byte offsets 1 and `1 + 16/32`, so every vector
/// access in the generated code is unaligned.
fn unaligned_pair<T: Copy, const N: usize>(a: [T; N], b: [T; N]) -> Vec<u8> {
    let bytes = N * std::mem::size_of::<T>();
    let mut buffer = vec![0u8; 2 * bytes + 1];
    unsafe {
        let base = buffer.as_mut_ptr().add(1);
        std::ptr::write_unaligned(base.cast::<[T; N]>(), a);
        std::ptr::write_unaligned(base.add(bytes).cast::<[T; N]>(), b);
    }
    buffer
}

fn vector_add_case<T, const N: usize>(
    a: [T; N],
    b: [T; N],
    add: fn(T, T) -> T,
    mnemonic: &str,
) where
    T: Scalar + Copy + PartialEq + Debug,
    [T; N]: VectorShape,
{
    let expected: [T; N] = std::array::from_fn(|i| add(a[i], b[i]));
    for memory in [false, true] {
        let (jit, stats) = compile(|backend| {
            let src = Ptr::<_, T>::arg(backend, 0)?;
            let dst = Ptr::<_, T>::arg(backend, 1)?;
            let mut sum: Vector<_, T, N> = make_vector(backend, &mut src.deref())?;
            if memory {
                sum.add_assign(&mut src.at(N as i64)?)?;
            } else {
                let rhs: Vector<_, T, N> = make_vector(backend, &mut src.at(N as i64)?)?;
                sum.add_assign(&rhs)?;
            }
            sum.store(&mut dst.deref())?;
            Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
        });

        let mut src = unaligned_pair(a, b);
        let mut dst = vec![0u8; N * std::mem::size_of::<T>() + 1];
        let dst_ptr = unsafe { dst.as_mut_ptr().add(1) };
        run(&jit, unsafe { src.as_mut_ptr().add(1) }, dst_ptr);
        let output = unsafe { std::ptr::read_unaligned(dst_ptr.cast::<[T; N]>()) };

        let form = if memory { "memory" } else { "register" };
        assert_eq!(output, expected, "{}x{} {} add", T::TYPE, N, form);
        assert_eq!(stats.count(mnemonic), 1, "{}x{} {} add", T::TYPE, N, form);
        assert_eq!(stats.vector_registers_allocated, if memory { 1 } else { 2 });
    }
}

macro_rules! vector_add_cases {
    ($($ty:ty, $n:literal => $mnemonic:literal;)*) => {$(
        vector_add_case::<$ty, $n>(
            std::array::from_fn(|i| <$ty>::MAX - i as $ty),
            std::array::from_fn(|i| (i as $ty).wrapping_mul(3).wrapping_add(1)),
            <$ty>::wrapping_add,
            $mnemonic,
        );
    )*};
}

#[test]
fn test_vector_add_every_lane_width() {
    vector_add_cases! {
        u8, 16 => "paddb";
        i16, 8 => "paddw";
        u32, 4 => "paddd";
        i64, 2 => "paddq";
    }
    if !has_avx2() {
        return;
    }
    vector_add_cases! {
        i8, 32 => "vpaddb";
        u16, 16 => "vpaddw";
        i32, 8 => "vpaddd";
        u64, 4 => "vpaddq";
    }
}

fn vector_shift_case<T, const N: usize>(input: [T; N], amount: u32, shr: fn(T, u32) -> T, mnemonic: &str)
where
    T: ShiftableLane + Copy + PartialEq + Debug,
    [T; N]: VectorShape,
{
    let (jit, stats) = compile(|backend| {
        let src = Ptr::<_, T>::arg(backend, 0)?;
        let dst = Ptr::<_, T>::arg(backend, 1)?;
        let mut v: Vector<_, T, N> = make_vector(backend, &mut src.deref())?;
        v.shr_assign(amount)?;
        v.store(&mut dst.deref())?;
        Value::<_, u64>::with_value(backend, 0, "zero")?.ret()
    });

    let mut src = unaligned_pair(input, input);
    let mut dst = vec![0u8; N * std::mem::size_of::<T>() + 1];
    let dst_ptr = unsafe { dst.as_mut_ptr().add(1) };
    run(&jit, unsafe { src.as_mut_ptr().add(1) }, dst_ptr);
    let output = unsafe { std::ptr::read_unaligned(dst_ptr.cast::<[T; N]>()) };

    let expected: [T; N] = std::array::from_fn(|i| shr(input[i], amount));
    assert_eq!(output, expected, "{}x{} shr {}", T::TYPE, N, amount);
    assert_eq!(stats.count(mnemonic), 1, "{}x{} shr {}", T::TYPE, N, amount);
}

// lanes shift as their unsigned counterpart, signed or not
macro_rules! vector_shift_cases {
    ($($ty:ty as $unsigned:ty, $n:literal >> $amount:literal => $mnemonic:literal;)*) => {$(
        vector_shift_case::<$ty, $n>(
            std::array::from_fn(|i| (i as $ty).wrapping_mul(-7i8 as $ty)),
            $amount,
            |lane, amount| ((lane as $unsigned) >> amount) as $ty,
            $mnemonic,
        );
    )*};
}

#[test]
fn test_vector_shift_every_lane_width() {
    vector_shift_cases! {
        i16 as u16, 8 >> 3 => "psrlw";
        u32 as u32, 4 >> 31 => "psrld";
        i64 as u64, 2 >> 1 => "psrlq";
    }
    if !has_avx2() {
        return;
    }
    vector_shift_cases! {
        u16 as u16, 16 >> 15 => "vpsrlw";
        i32 as u32, 8 >> 4 => "vpsrld";
        u64 as u64, 4 >> 63 => "vpsrlq";
    }
}

fn init_and_return<T: Scalar>(init: T) -> u64 {
    let (jit, stats) = compile(|backend| Value::<_, T>::with_value(backend, init, "init")?.ret());
    assert_eq!(stats.registers_allocated, 1);
    run(&jit, std::ptr::null_mut(), std::ptr::null_mut())
}

#[test]
fn test_with_value_every_type() {
    assert_eq!(init_and_return(0xABu8), 0xAB);
    assert_eq!(init_and_return(-2i8), 0xFE);
    assert_eq!(init_and_return(0xFFFEu16), 0xFFFE);
    assert_eq!(init_and_return(i16::MIN), 0x8000);
    assert_eq!(init_and_return(u32::MAX), 0xFFFF_FFFF);
    assert_eq!(init_and_return(-5i32), 0xFFFF_FFFB);
    assert_eq!(init_and_return(u64::MAX - 1), u64::MAX - 1);
    assert_eq!(init_and_return(i64::MIN), 1 << 63);
}

#[test]
fn test_unsigned_divisor_reported_exactly() {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = X64Backend::new().unwrap();
    let mut x = Value::<_, u64>::new(&backend, "x").unwrap();
    let before = backend.stats().instructions_emitted;

    let divisor = u64::MAX - 12;
    let err = x.div_assign(divisor).err().unwrap();
    assert_eq!(err, CodegenError::UnsupportedDivisor { divisor: i128::from(divisor) });
    assert!(err.to_string().contains("18446744073709551603"));
    assert_eq!(backend.stats().instructions_emitted, before);

    let mut v = Vector::<_, u64, 2>::new(&backend, "v").unwrap();
    assert_eq!(
        v.div_assign(u64::MAX).err(),
        Some(CodegenError::UnsupportedDivisor { divisor: i128::from(u64::MAX) })
    );
}

#[test]
fn test_vector_rejections_emit_nothing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = X64Backend::new().unwrap();
    let mut v = Vector::<_, u32, 4>::new(&backend, "v").unwrap();
    let before = backend.stats().instructions_emitted;

    assert_eq!(
        v.div_assign(3).err(),
        Some(CodegenError::UnsupportedDivisor { divisor: 3 })
    );
    assert_eq!(
        v.shr_assign(32).err(),
        Some(CodegenError::ShiftOutOfRange { amount: 32, bits: 32 })
    );
    assert_eq!(backend.stats().instructions_emitted, before);
}
