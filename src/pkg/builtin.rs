//! Source of the `builtin` package.
//!
//! Every module implicitly imports these types. Method bodies marked
//! `compile_intrinsic` are provided by the back-end; the verify pass
//! rejects that marker anywhere outside this package.

pub const BUILTIN_SOURCE: &str = r#"
"""
Core types of the language.
"""

interface tag Any

primitive None

primitive Bool
  fun op_and(that: Bool): Bool => compile_intrinsic
  fun op_or(that: Bool): Bool => compile_intrinsic
  fun op_xor(that: Bool): Bool => compile_intrinsic
  fun op_not(): Bool => compile_intrinsic
  fun eq(that: Bool): Bool => compile_intrinsic
  fun ne(that: Bool): Bool => compile_intrinsic

trait val Number[A: Any val]
  fun add(that: A): A => compile_intrinsic
  fun sub(that: A): A => compile_intrinsic
  fun mul(that: A): A => compile_intrinsic
  fun div(that: A): A => compile_intrinsic
  fun mod(that: A): A => compile_intrinsic
  fun shl(that: A): A => compile_intrinsic
  fun shr(that: A): A => compile_intrinsic
  fun op_and(that: A): A => compile_intrinsic
  fun op_or(that: A): A => compile_intrinsic
  fun op_xor(that: A): A => compile_intrinsic
  fun op_not(): A => compile_intrinsic
  fun neg(): A => compile_intrinsic
  fun eq(that: A): Bool => compile_intrinsic
  fun ne(that: A): Bool => compile_intrinsic
  fun lt(that: A): Bool => compile_intrinsic
  fun le(that: A): Bool => compile_intrinsic
  fun gt(that: A): Bool => compile_intrinsic
  fun ge(that: A): Bool => compile_intrinsic

primitive I8 is Number[I8]
primitive I16 is Number[I16]
primitive I32 is Number[I32]
primitive I64 is Number[I64]
primitive I128 is Number[I128]
primitive ISize is Number[ISize]
primitive U8 is Number[U8]
primitive U16 is Number[U16]
primitive U32 is Number[U32]
primitive U64 is Number[U64]
primitive U128 is Number[U128]
primitive USize is Number[USize]
primitive F32 is Number[F32]
primitive F64 is Number[F64]

interface box Stringable
  fun string(): String

class val String
  fun size(): USize => compile_intrinsic
  fun add(that: String box): String => compile_intrinsic
  fun eq(that: String box): Bool => compile_intrinsic
  fun ne(that: String box): Bool => compile_intrinsic
  fun string(): String => compile_intrinsic

class val Env
  """
  The process environment handed to Main.
  """

interface Iterator[A]
  fun ref has_next(): Bool
  fun ref next(): A ?

struct Pointer[A]

class Array[A]
  new create(len: USize = 0) => compile_intrinsic
  fun size(): USize => compile_intrinsic
  fun ref push(value: A): Bool => compile_intrinsic
  fun apply(i: USize): this->A ? => compile_intrinsic
  fun ref update(i: USize, value: A): A^ ? => compile_intrinsic
"#;
