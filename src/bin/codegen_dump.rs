//! Code generation dump tool.
//!
//! Builds one of the demo kernels with the selected backend and prints the
//! result: Intel-syntax disassembly for x64, textual IR for LLVM, followed by
//! the emission statistics.
//!
//! ```text
//! codegen-dump scalar
//! codegen-dump vector --no-avx2 --run
//! codegen-dump scalar --backend llvm
//! ```

use clap::{Parser, ValueEnum};
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};
use typed_codegen::core::{Backend, CodegenResult, VectorShape};
use typed_codegen::x64::{X64Backend, X64Config};
use typed_codegen::{make_vector, Ptr, Value, Vector};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kernel {
    /// ((x + 5) >> 1) / 2 on a u32 from the first argument, widened into the
    /// second, plus one if the result is below 10
    Scalar,
    /// Sum of two u32x4 halves, halved, stored to the second argument
    Vector,
    /// Same as `vector` with u32x8 halves
    Vector256,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    X64,
    #[cfg(feature = "llvm")]
    Llvm,
}

#[derive(Parser)]
#[command(name = "codegen-dump")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dump the code generated for a demo kernel", long_about = None)]
struct Cli {
    /// Kernel to generate
    #[arg(value_enum)]
    kernel: Kernel,

    /// Backend to generate with
    #[arg(long, value_enum, default_value = "x64")]
    backend: BackendKind,

    /// Never emit 256-bit vectors, even if the host supports AVX2
    #[arg(long)]
    no_avx2: bool,

    /// Base address for the disassembly listing
    #[arg(long, default_value_t = 0x1000)]
    base_address: u64,

    /// Execute the kernel on sample data after dumping it
    #[arg(long)]
    run: bool,
}

fn scalar_kernel<B: Backend>(backend: &B) -> CodegenResult<()> {
    let src = Ptr::<_, u32>::arg(backend, 0)?;
    let dst = Ptr::<_, u64>::arg(backend, 1)?;

    let mut x = Value::<_, u32>::new(backend, "x")?;
    x.assign(&src.deref())?;
    x.add_assign(5u32)?.shr_assign(1u32)?.div_assign(2)?;

    let mut wide = Value::<_, u64>::new(backend, "wide")?;
    wide.widen(&x)?;
    wide.store_to(&dst.deref())?;

    let mut below = Value::<_, u8>::new(backend, "below")?;
    x.cmp_lt(10u32).materialize(&mut below)?;
    let mut flag = Value::<_, u32>::new(backend, "flag")?;
    flag.widen(&below)?;
    x.add_assign(&flag)?;
    x.ret()
}

fn vector_kernel<B: Backend, const N: usize>(backend: &B) -> CodegenResult<()>
where
    [u32; N]: VectorShape,
{
    let src = Ptr::<_, u32>::arg(backend, 0)?;
    let dst = Ptr::<_, u32>::arg(backend, 1)?;

    let mut sum: Vector<_, u32, N> = make_vector(backend, &mut src.deref())?;
    sum.add_assign(&mut src.at(N as i64)?)?;
    sum.div_assign(2)?;
    sum.store(&mut dst.deref())?;

    let lanes = Value::<_, u64>::with_value(backend, sum.width() as u64, "lanes")?;
    lanes.ret()
}

fn generate<B: Backend>(kernel: Kernel, backend: &B) -> CodegenResult<()> {
    match kernel {
        Kernel::Scalar => scalar_kernel(backend),
        Kernel::Vector => vector_kernel::<_, 4>(backend),
        Kernel::Vector256 => vector_kernel::<_, 8>(backend),
    }
}

fn print_disassembly(code: &[u8], base_address: u64) {
    let mut decoder = Decoder::with_ip(64, code, base_address, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut output = String::new();
    let mut instruction = Instruction::default();

    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        output.clear();
        formatter.format(&instruction, &mut output);

        let start = (instruction.ip() - base_address) as usize;
        let bytes: String = code[start..start + instruction.len()]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        println!("{:016X} {:<24} {}", instruction.ip(), bytes, output);
    }
}

fn run_x64(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = X64Config {
        allow_avx2: X64Config::default().allow_avx2 && !cli.no_avx2,
        base_address: cli.base_address,
    };
    let backend = X64Backend::with_config(config)?;
    generate(cli.kernel, &backend)?;

    print_disassembly(&backend.assemble()?, cli.base_address);
    println!();
    print!("{}", backend.stats());

    if cli.run {
        let jit = backend.finalize()?;
        let mut src: Vec<u32> = (1..=16).collect();
        let mut dst = vec![0u32; 16];
        // SAFETY: both buffers hold 16 elements, more than any kernel touches.
        let result = unsafe {
            jit.call(
                src.as_mut_ptr().cast(),
                dst.as_mut_ptr().cast(),
                std::ptr::null_mut(),
            )
        };
        println!();
        println!("result: {}", result);
        println!("dst: {:?}", dst);
    }
    Ok(())
}

#[cfg(feature = "llvm")]
fn run_llvm(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    use inkwell::context::Context;
    use typed_codegen::llvm::LlvmBackend;

    let context = Context::create();
    let backend = LlvmBackend::new(&context, "kernel");
    generate(cli.kernel, &backend)?;

    print!("{}", backend.print_ir());
    println!();
    print!("{}", backend.stats());

    if cli.run {
        let jit = backend.finalize()?;
        let mut src: Vec<u32> = (1..=16).collect();
        let mut dst = vec![0u32; 16];
        // SAFETY: both buffers hold 16 elements, more than any kernel touches.
        let result = unsafe {
            jit.call(
                src.as_mut_ptr().cast(),
                dst.as_mut_ptr().cast(),
                std::ptr::null_mut(),
            )
        };
        println!();
        println!("result: {}", result);
        println!("dst: {:?}", dst);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.backend {
        BackendKind::X64 => run_x64(&cli),
        #[cfg(feature = "llvm")]
        BackendKind::Llvm => run_llvm(&cli),
    }
}
