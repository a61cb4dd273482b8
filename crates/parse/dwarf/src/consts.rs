//! DWARF tag, attribute, form, and encoding constants.
//!
//! Only the subset used when recovering C type information is listed.
//! Values are from the DWARF 5 specification, section 7.

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// `DW_TAG_array_type`
pub const DW_TAG_ARRAY_TYPE: u64 = 0x01;
/// `DW_TAG_enumeration_type`
pub const DW_TAG_ENUMERATION_TYPE: u64 = 0x04;
/// `DW_TAG_formal_parameter`
pub const DW_TAG_FORMAL_PARAMETER: u64 = 0x05;
/// `DW_TAG_member`
pub const DW_TAG_MEMBER: u64 = 0x0d;
/// `DW_TAG_pointer_type`
pub const DW_TAG_POINTER_TYPE: u64 = 0x0f;
/// `DW_TAG_compile_unit`
pub const DW_TAG_COMPILE_UNIT: u64 = 0x11;
/// `DW_TAG_structure_type`
pub const DW_TAG_STRUCTURE_TYPE: u64 = 0x13;
/// `DW_TAG_subroutine_type`
pub const DW_TAG_SUBROUTINE_TYPE: u64 = 0x15;
/// `DW_TAG_typedef`
pub const DW_TAG_TYPEDEF: u64 = 0x16;
/// `DW_TAG_union_type`
pub const DW_TAG_UNION_TYPE: u64 = 0x17;
/// `DW_TAG_subrange_type`
pub const DW_TAG_SUBRANGE_TYPE: u64 = 0x21;
/// `DW_TAG_base_type`
pub const DW_TAG_BASE_TYPE: u64 = 0x24;
/// `DW_TAG_const_type`
pub const DW_TAG_CONST_TYPE: u64 = 0x26;
/// `DW_TAG_enumerator`
pub const DW_TAG_ENUMERATOR: u64 = 0x28;
/// `DW_TAG_subprogram`
pub const DW_TAG_SUBPROGRAM: u64 = 0x2e;
/// `DW_TAG_variable`
pub const DW_TAG_VARIABLE: u64 = 0x34;
/// `DW_TAG_volatile_type`
pub const DW_TAG_VOLATILE_TYPE: u64 = 0x35;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// `DW_AT_location`
pub const DW_AT_LOCATION: u64 = 0x02;
/// `DW_AT_name`
pub const DW_AT_NAME: u64 = 0x03;
/// `DW_AT_byte_size`
pub const DW_AT_BYTE_SIZE: u64 = 0x0b;
/// `DW_AT_low_pc`
pub const DW_AT_LOW_PC: u64 = 0x11;
/// `DW_AT_const_value`
pub const DW_AT_CONST_VALUE: u64 = 0x1c;
/// `DW_AT_upper_bound`
pub const DW_AT_UPPER_BOUND: u64 = 0x2f;
/// `DW_AT_count`
pub const DW_AT_COUNT: u64 = 0x37;
/// `DW_AT_data_member_location`
pub const DW_AT_DATA_MEMBER_LOCATION: u64 = 0x38;
/// `DW_AT_declaration`
pub const DW_AT_DECLARATION: u64 = 0x3c;
/// `DW_AT_encoding`
pub const DW_AT_ENCODING: u64 = 0x3e;
/// `DW_AT_external`
pub const DW_AT_EXTERNAL: u64 = 0x3f;
/// `DW_AT_type`
pub const DW_AT_TYPE: u64 = 0x49;
/// `DW_AT_str_offsets_base`
pub const DW_AT_STR_OFFSETS_BASE: u64 = 0x72;
/// `DW_AT_addr_base`
pub const DW_AT_ADDR_BASE: u64 = 0x73;

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

/// `DW_FORM_addr`
pub const DW_FORM_ADDR: u64 = 0x01;
/// `DW_FORM_block2`
pub const DW_FORM_BLOCK2: u64 = 0x03;
/// `DW_FORM_block4`
pub const DW_FORM_BLOCK4: u64 = 0x04;
/// `DW_FORM_data2`
pub const DW_FORM_DATA2: u64 = 0x05;
/// `DW_FORM_data4`
pub const DW_FORM_DATA4: u64 = 0x06;
/// `DW_FORM_data8`
pub const DW_FORM_DATA8: u64 = 0x07;
/// `DW_FORM_string`
pub const DW_FORM_STRING: u64 = 0x08;
/// `DW_FORM_block`
pub const DW_FORM_BLOCK: u64 = 0x09;
/// `DW_FORM_block1`
pub const DW_FORM_BLOCK1: u64 = 0x0a;
/// `DW_FORM_data1`
pub const DW_FORM_DATA1: u64 = 0x0b;
/// `DW_FORM_flag`
pub const DW_FORM_FLAG: u64 = 0x0c;
/// `DW_FORM_sdata`
pub const DW_FORM_SDATA: u64 = 0x0d;
/// `DW_FORM_strp`
pub const DW_FORM_STRP: u64 = 0x0e;
/// `DW_FORM_udata`
pub const DW_FORM_UDATA: u64 = 0x0f;
/// `DW_FORM_ref_addr`
pub const DW_FORM_REF_ADDR: u64 = 0x10;
/// `DW_FORM_ref1`
pub const DW_FORM_REF1: u64 = 0x11;
/// `DW_FORM_ref2`
pub const DW_FORM_REF2: u64 = 0x12;
/// `DW_FORM_ref4`
pub const DW_FORM_REF4: u64 = 0x13;
/// `DW_FORM_ref8`
pub const DW_FORM_REF8: u64 = 0x14;
/// `DW_FORM_ref_udata`
pub const DW_FORM_REF_UDATA: u64 = 0x15;
/// `DW_FORM_indirect`
pub const DW_FORM_INDIRECT: u64 = 0x16;
/// `DW_FORM_sec_offset`
pub const DW_FORM_SEC_OFFSET: u64 = 0x17;
/// `DW_FORM_exprloc`
pub const DW_FORM_EXPRLOC: u64 = 0x18;
/// `DW_FORM_flag_present`
pub const DW_FORM_FLAG_PRESENT: u64 = 0x19;
/// `DW_FORM_strx`
pub const DW_FORM_STRX: u64 = 0x1a;
/// `DW_FORM_addrx`
pub const DW_FORM_ADDRX: u64 = 0x1b;
/// `DW_FORM_data16`
pub const DW_FORM_DATA16: u64 = 0x1e;
/// `DW_FORM_line_strp`
pub const DW_FORM_LINE_STRP: u64 = 0x1f;
/// `DW_FORM_ref_sig8`
pub const DW_FORM_REF_SIG8: u64 = 0x20;
/// `DW_FORM_implicit_const`
pub const DW_FORM_IMPLICIT_CONST: u64 = 0x21;
/// `DW_FORM_loclistx`
pub const DW_FORM_LOCLISTX: u64 = 0x22;
/// `DW_FORM_rnglistx`
pub const DW_FORM_RNGLISTX: u64 = 0x23;
/// `DW_FORM_strx1`
pub const DW_FORM_STRX1: u64 = 0x25;
/// `DW_FORM_strx2`
pub const DW_FORM_STRX2: u64 = 0x26;
/// `DW_FORM_strx3`
pub const DW_FORM_STRX3: u64 = 0x27;
/// `DW_FORM_strx4`
pub const DW_FORM_STRX4: u64 = 0x28;
/// `DW_FORM_addrx1`
pub const DW_FORM_ADDRX1: u64 = 0x29;
/// `DW_FORM_addrx2`
pub const DW_FORM_ADDRX2: u64 = 0x2a;
/// `DW_FORM_addrx3`
pub const DW_FORM_ADDRX3: u64 = 0x2b;
/// `DW_FORM_addrx4`
pub const DW_FORM_ADDRX4: u64 = 0x2c;

// ---------------------------------------------------------------------------
// Base type encodings
// ---------------------------------------------------------------------------

/// `DW_ATE_boolean`
pub const DW_ATE_BOOLEAN: u64 = 0x02;
/// `DW_ATE_float`
pub const DW_ATE_FLOAT: u64 = 0x04;
/// `DW_ATE_signed`
pub const DW_ATE_SIGNED: u64 = 0x05;
/// `DW_ATE_signed_char`
pub const DW_ATE_SIGNED_CHAR: u64 = 0x06;
/// `DW_ATE_unsigned`
pub const DW_ATE_UNSIGNED: u64 = 0x07;
/// `DW_ATE_unsigned_char`
pub const DW_ATE_UNSIGNED_CHAR: u64 = 0x08;

// ---------------------------------------------------------------------------
// Location expression opcodes
// ---------------------------------------------------------------------------

/// `DW_OP_addr` — the only location opcode honored for variables.
pub const DW_OP_ADDR: u8 = 0x03;

// ---------------------------------------------------------------------------
// Unit types (DWARF 5)
// ---------------------------------------------------------------------------

/// `DW_UT_compile`
pub const DW_UT_COMPILE: u8 = 0x01;
/// `DW_UT_partial`
pub const DW_UT_PARTIAL: u8 = 0x03;
