// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════
mod row_buffer_tests {
    use std::io::{Seek, SeekFrom};
    use std::sync::Arc;

    use proptest::prelude::*;
    use uuid::Uuid;

    use crate::config::RowConfig;
    use crate::error::RowError;
    use crate::layout::{
        Layout, LayoutBuilder, LayoutResolver, LayoutResolverNamespace, LayoutType, ScopeKind,
        TypeArgument, TypeArgumentList,
    };
    use crate::row::{RowBuffer, RowCursor, UnboundRowBuffer};
    use crate::types::*;

    const PERSON: SchemaId = SchemaId(1);
    const POINT: SchemaId = SchemaId(2);

    fn person_layout() -> Layout {
        LayoutBuilder::new("Person", PERSON)
            .add_fixed_column("id", LayoutType::Int32, true, 0)
            .add_fixed_column("active", LayoutType::Boolean, true, 0)
            .add_fixed_column("code", LayoutType::Utf8, true, 3)
            .add_variable_column("name", LayoutType::Utf8, 0)
            .add_variable_column("tag", LayoutType::Binary, 4)
            .add_variable_column("rank", LayoutType::VarInt, 0)
            .add_sparse_column("scores", LayoutType::TYPED_ARRAY, int32_args())
            .build()
            .unwrap()
    }

    fn point_layout() -> Layout {
        LayoutBuilder::new("Point", POINT)
            .add_fixed_column("x", LayoutType::Int32, true, 0)
            .add_fixed_column("y", LayoutType::Int32, true, 0)
            .build()
            .unwrap()
    }

    fn namespace() -> Arc<LayoutResolverNamespace> {
        let mut ns = LayoutResolverNamespace::new();
        ns.register(Arc::new(person_layout()));
        ns.register(Arc::new(point_layout()));
        Arc::new(ns)
    }

    fn new_row(ns: &Arc<LayoutResolverNamespace>) -> RowBuffer {
        new_row_with_config(ns, RowConfig::default())
    }

    fn new_row_with_config(ns: &Arc<LayoutResolverNamespace>, config: RowConfig) -> RowBuffer {
        let layout = ns.resolve(PERSON).unwrap();
        UnboundRowBuffer::with_config(config).init_layout(HybridRowVersion::V1, layout, ns.clone())
    }

    fn int32_args() -> TypeArgumentList {
        TypeArgumentList::new(vec![TypeArgument::new(LayoutType::Int32)])
    }

    fn map_args() -> TypeArgumentList {
        TypeArgumentList::new(vec![
            TypeArgument::new(LayoutType::Utf8),
            TypeArgument::new(LayoutType::Int32),
        ])
    }

    /// Root cursor positioned at `path`, or at the end of the row if absent.
    fn cursor_at(row: &RowBuffer, path: &str) -> RowCursor {
        let mut cursor = row.create_cursor();
        cursor.find(row, path);
        cursor
    }

    fn read_i32s(row: &RowBuffer, scope: &mut RowCursor) -> Vec<i32> {
        let mut values = Vec::new();
        while scope.move_next(row) {
            values.push(row.read_sparse::<i32>(scope).unwrap());
        }
        values
    }

    fn write_i32s(row: &mut RowBuffer, scope: &mut RowCursor, values: &[i32]) {
        for &v in values {
            row.write_sparse(scope, v, UpdateOptions::Upsert).unwrap();
            scope.move_next(row);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Buffer lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_init_layout_writes_header_and_fixed_region() {
        let ns = namespace();
        let row = new_row(&ns);
        let layout = person_layout();

        assert_eq!(row.len(), HEADER_SIZE + layout.size());
        assert_eq!(row.header().version, HybridRowVersion::V1);
        assert_eq!(row.header().schema_id, PERSON);
        assert_eq!(row.as_bytes()[0], 0x81);
        assert!(row.as_bytes()[HEADER_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bad_version_rejected() {
        let ns = namespace();
        let mut bytes = new_row(&ns).to_byte_array();
        bytes[0] = 0x42;
        assert!(matches!(
            RowBuffer::from_bytes(bytes, HybridRowVersion::V1, ns.clone()),
            Err(RowError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_unexpected_version_rejected() {
        let ns = namespace();
        let bytes = new_row(&ns).to_byte_array();
        assert!(matches!(
            RowBuffer::from_bytes(bytes, HybridRowVersion::Invalid, ns.clone()),
            Err(RowError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_unknown_schema_rejected() {
        let ns = namespace();
        let mut bytes = new_row(&ns).to_byte_array();
        bytes[1..HEADER_SIZE].copy_from_slice(&99i32.to_le_bytes());
        assert!(matches!(
            RowBuffer::from_bytes(bytes, HybridRowVersion::V1, ns.clone()),
            Err(RowError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_truncated_fixed_region_rejected() {
        let ns = namespace();
        let bytes = new_row(&ns).to_byte_array();
        assert!(matches!(
            RowBuffer::from_bytes(bytes[..HEADER_SIZE + 1].to_vec(), HybridRowVersion::V1, ns.clone()),
            Err(RowError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_reset_and_load_reuse_allocation() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "greeting");
        row.write_sparse_string(&mut c, "hello", UpdateOptions::Upsert).unwrap();
        let bytes = row.to_byte_array();

        let unbound = row.reset();
        assert!(unbound.capacity() >= bytes.len());
        let row = unbound.load(&bytes, HybridRowVersion::V1, ns.clone()).unwrap();
        let c = cursor_at(&row, "greeting");
        assert_eq!(row.read_sparse_string(&c).unwrap(), "hello");
    }

    #[test]
    fn test_stream_round_trip() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "scores");
        let mut scores = row
            .write_typed_array(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        write_i32s(&mut row, &mut scores, &[7, 8]);

        let mut file = tempfile::tempfile().unwrap();
        row.write_to_stream(&mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let loaded =
            RowBuffer::read_from_stream(&mut file, row.len(), HybridRowVersion::V1, ns.clone())
                .unwrap();
        assert_eq!(loaded.as_bytes(), row.as_bytes());
        let c = cursor_at(&loaded, "scores");
        let mut scores = loaded.read_scope(&c, ScopeKind::TypedArray).unwrap();
        assert_eq!(read_i32s(&loaded, &mut scores), vec![7, 8]);
    }

    #[test]
    fn test_short_stream_is_insufficient_buffer() {
        let ns = namespace();
        let bytes = new_row(&ns).to_byte_array();
        let mut reader = &bytes[..3];
        assert!(matches!(
            RowBuffer::read_from_stream(&mut reader, bytes.len(), HybridRowVersion::V1, ns.clone()),
            Err(RowError::InsufficientBuffer)
        ));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Schematized columns
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_fixed_columns() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let layout = row.layout().clone();
        let root = row.create_cursor();
        let id = layout.try_find("id").unwrap();
        let active = layout.try_find("active").unwrap();
        let code = layout.try_find("code").unwrap();

        assert!(matches!(row.read_fixed_column::<i32>(&root, id), Err(RowError::NotFound)));
        row.write_fixed_column(&root, id, 42i32).unwrap();
        row.write_fixed_bool(&root, active, true).unwrap();
        row.write_fixed_column_string(&root, code, "ab").unwrap();

        assert_eq!(row.read_fixed_column::<i32>(&root, id).unwrap(), 42);
        assert!(row.read_fixed_bool(&root, active).unwrap());
        assert_eq!(row.read_fixed_column_string(&root, code).unwrap(), "ab");
        assert!(matches!(
            row.write_fixed_column_string(&root, code, "abcd"),
            Err(RowError::TooBig { .. })
        ));
        assert!(matches!(
            row.read_fixed_column::<i64>(&root, id),
            Err(RowError::TypeMismatch { .. })
        ));

        row.delete_fixed_column(&root, id).unwrap();
        assert!(matches!(row.read_fixed_column::<i32>(&root, id), Err(RowError::NotFound)));
        assert!(row.read_fixed_bool(&root, active).unwrap());
    }

    #[test]
    fn test_variable_columns_shift_sparse_region() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let layout = row.layout().clone();
        let name = layout.try_find("name").unwrap();
        let rank = layout.try_find("rank").unwrap();

        let mut c = cursor_at(&row, "note");
        row.write_sparse_string(&mut c, "sparse", UpdateOptions::Upsert).unwrap();

        let mut root = row.create_cursor();
        row.write_variable_column_string(&mut root, name, "Alice").unwrap();
        row.write_variable_column_varint(&mut root, rank, -3).unwrap();
        assert_eq!(row.read_variable_column_string(&root, name).unwrap(), "Alice");
        assert_eq!(row.read_variable_column_varint(&root, rank).unwrap(), -3);

        let c = cursor_at(&row, "note");
        assert_eq!(row.read_sparse_string(&c).unwrap(), "sparse");

        row.write_variable_column_string(&mut root, name, "Al").unwrap();
        assert_eq!(row.read_variable_column_string(&root, name).unwrap(), "Al");
        assert_eq!(row.read_variable_column_varint(&root, rank).unwrap(), -3);

        row.delete_variable_column(&mut root, name).unwrap();
        assert!(matches!(
            row.read_variable_column_string(&root, name),
            Err(RowError::NotFound)
        ));
        let c = cursor_at(&row, "note");
        assert_eq!(row.read_sparse_string(&c).unwrap(), "sparse");
    }

    #[test]
    fn test_variable_column_length_cap() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let layout = row.layout().clone();
        let tag = layout.try_find("tag").unwrap();
        let mut root = row.create_cursor();

        row.write_variable_column_binary(&mut root, tag, &[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            row.write_variable_column_binary(&mut root, tag, &[0; 5]),
            Err(RowError::TooBig { .. })
        ));
        assert_eq!(row.read_variable_column_binary(&root, tag).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_variable_column_varuint_cap() {
        const COUNTER: SchemaId = SchemaId(3);
        let counter = LayoutBuilder::new("Counter", COUNTER)
            .add_variable_column("hits", LayoutType::VarUInt, 0)
            .build()
            .unwrap();
        let mut ns = LayoutResolverNamespace::new();
        ns.register(Arc::new(counter));
        let ns = Arc::new(ns);
        let layout = ns.resolve(COUNTER).unwrap();
        let mut row = UnboundRowBuffer::default().init_layout(
            HybridRowVersion::V1,
            layout.clone(),
            ns.clone(),
        );
        let hits = layout.try_find("hits").unwrap();
        let mut root = row.create_cursor();

        row.write_variable_column_varuint(&mut root, hits, u64::from(u32::MAX))
            .unwrap();
        assert!(matches!(
            row.write_variable_column_varuint(&mut root, hits, u64::from(u32::MAX) + 1),
            Err(RowError::TooBig { .. })
        ));
        assert_eq!(
            row.read_variable_column_varuint(&root, hits).unwrap(),
            u64::from(u32::MAX)
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sparse primitives
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_sparse_fixed_width_round_trip() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let guid = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let oid = MongoDbObjectId([7; 12]);

        macro_rules! put {
            ($path:expr, $value:expr) => {{
                let mut c = cursor_at(&row, $path);
                row.write_sparse(&mut c, $value, UpdateOptions::Upsert).unwrap();
            }};
        }
        put!("i8", -8i8);
        put!("i16", -16i16);
        put!("i32", -32i32);
        put!("i64", i64::MIN);
        put!("u8", 8u8);
        put!("u16", 16u16);
        put!("u32", u32::MAX);
        put!("u64", u64::MAX);
        put!("f32", 1.5f32);
        put!("f64", std::f64::consts::PI);
        put!("f128", Float128::new(1, -2));
        put!("dec", Decimal::new(3, 4));
        put!("dt", DateTime(637_000_000_000_000_000));
        put!("unix", UnixDateTime(1_700_000_000_000));
        put!("guid", guid);
        put!("oid", oid);

        assert_eq!(row.read_sparse::<i8>(&cursor_at(&row, "i8")).unwrap(), -8);
        assert_eq!(row.read_sparse::<i16>(&cursor_at(&row, "i16")).unwrap(), -16);
        assert_eq!(row.read_sparse::<i32>(&cursor_at(&row, "i32")).unwrap(), -32);
        assert_eq!(row.read_sparse::<i64>(&cursor_at(&row, "i64")).unwrap(), i64::MIN);
        assert_eq!(row.read_sparse::<u8>(&cursor_at(&row, "u8")).unwrap(), 8);
        assert_eq!(row.read_sparse::<u16>(&cursor_at(&row, "u16")).unwrap(), 16);
        assert_eq!(row.read_sparse::<u32>(&cursor_at(&row, "u32")).unwrap(), u32::MAX);
        assert_eq!(row.read_sparse::<u64>(&cursor_at(&row, "u64")).unwrap(), u64::MAX);
        assert_eq!(row.read_sparse::<f32>(&cursor_at(&row, "f32")).unwrap(), 1.5);
        assert_eq!(
            row.read_sparse::<f64>(&cursor_at(&row, "f64")).unwrap(),
            std::f64::consts::PI
        );
        assert_eq!(
            row.read_sparse::<Float128>(&cursor_at(&row, "f128")).unwrap(),
            Float128::new(1, -2)
        );
        assert_eq!(
            row.read_sparse::<Decimal>(&cursor_at(&row, "dec")).unwrap(),
            Decimal::new(3, 4)
        );
        assert_eq!(
            row.read_sparse::<DateTime>(&cursor_at(&row, "dt")).unwrap(),
            DateTime(637_000_000_000_000_000)
        );
        assert_eq!(
            row.read_sparse::<UnixDateTime>(&cursor_at(&row, "unix")).unwrap(),
            UnixDateTime(1_700_000_000_000)
        );
        assert_eq!(row.read_sparse::<Uuid>(&cursor_at(&row, "guid")).unwrap(), guid);
        assert_eq!(row.read_sparse::<MongoDbObjectId>(&cursor_at(&row, "oid")).unwrap(), oid);
    }

    #[test]
    fn test_sparse_variable_round_trip() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "s");
        row.write_sparse_string(&mut c, "héllo", UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "b");
        row.write_sparse_binary(&mut c, &[0, 255, 1], UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "vi");
        row.write_sparse_varint(&mut c, -300, UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "vu");
        row.write_sparse_varuint(&mut c, u64::from(u32::MAX), UpdateOptions::Upsert)
            .unwrap();

        assert_eq!(row.read_sparse_string(&cursor_at(&row, "s")).unwrap(), "héllo");
        assert_eq!(row.read_sparse_binary(&cursor_at(&row, "b")).unwrap(), &[0, 255, 1]);
        assert_eq!(row.read_sparse_varint(&cursor_at(&row, "vi")).unwrap(), -300);
        assert_eq!(
            row.read_sparse_varuint(&cursor_at(&row, "vu")).unwrap(),
            u64::from(u32::MAX)
        );
    }

    #[test]
    fn test_sparse_bool_and_null() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "yes");
        row.write_sparse_bool(&mut c, true, UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "no");
        row.write_sparse_bool(&mut c, false, UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "nothing");
        row.write_sparse_null(&mut c, UpdateOptions::Upsert).unwrap();

        assert!(row.read_sparse_bool(&cursor_at(&row, "yes")).unwrap());
        assert!(!row.read_sparse_bool(&cursor_at(&row, "no")).unwrap());
        row.read_sparse_null(&cursor_at(&row, "nothing")).unwrap();
        assert!(matches!(
            row.read_sparse_null(&cursor_at(&row, "yes")),
            Err(RowError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_upsert_resizes_in_place() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "a");
        row.write_sparse_string(&mut c, "x", UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "z");
        row.write_sparse::<i64>(&mut c, 99, UpdateOptions::Upsert).unwrap();

        let mut c = cursor_at(&row, "a");
        row.write_sparse_string(&mut c, "a much longer value", UpdateOptions::Upsert)
            .unwrap();
        assert_eq!(
            row.read_sparse_string(&cursor_at(&row, "a")).unwrap(),
            "a much longer value"
        );
        assert_eq!(row.read_sparse::<i64>(&cursor_at(&row, "z")).unwrap(), 99);

        let mut c = cursor_at(&row, "a");
        row.write_sparse::<u8>(&mut c, 1, UpdateOptions::Upsert).unwrap();
        assert_eq!(row.read_sparse::<u8>(&cursor_at(&row, "a")).unwrap(), 1);
        assert_eq!(row.read_sparse::<i64>(&cursor_at(&row, "z")).unwrap(), 99);
    }

    #[test]
    fn test_update_options_preconditions() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "a");
        assert!(matches!(
            row.write_sparse::<i32>(&mut c, 1, UpdateOptions::Update),
            Err(RowError::NotFound)
        ));
        row.write_sparse::<i32>(&mut c, 1, UpdateOptions::Insert).unwrap();

        let mut c = cursor_at(&row, "a");
        assert!(matches!(
            row.write_sparse::<i32>(&mut c, 2, UpdateOptions::Insert),
            Err(RowError::Exists)
        ));
        row.write_sparse::<i32>(&mut c, 3, UpdateOptions::Update).unwrap();
        assert_eq!(row.read_sparse::<i32>(&cursor_at(&row, "a")).unwrap(), 3);
    }

    #[test]
    fn test_read_wrong_type_is_mismatch() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "n");
        row.write_sparse::<i32>(&mut c, 5, UpdateOptions::Upsert).unwrap();

        let c = cursor_at(&row, "n");
        assert!(matches!(
            row.read_sparse_string(&c),
            Err(RowError::TypeMismatch {
                expected: LayoutCode::Utf8,
                actual: LayoutCode::Int32
            })
        ));
        assert!(matches!(
            row.read_sparse::<i32>(&cursor_at(&row, "missing")),
            Err(RowError::NotFound)
        ));
    }

    #[test]
    fn test_interned_and_inline_paths() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "scores");
        row.write_typed_array(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        let mut c = cursor_at(&row, "not-in-schema");
        row.write_sparse::<i32>(&mut c, 1, UpdateOptions::Upsert).unwrap();

        let c = cursor_at(&row, "scores");
        let token = row.layout().tokenizer().find_token("scores").unwrap().id;
        assert_eq!(c.path_token(), token);
        assert_eq!(row.read_sparse_path(&c).unwrap(), "scores");
        assert_eq!(c.write_path_token().map(|t| t.id), Some(token));

        let c = cursor_at(&row, "not-in-schema");
        assert!(c.path_token() >= row.layout().tokenizer().count() as u64);
        assert_eq!(row.read_sparse_path(&c).unwrap(), "not-in-schema");
        assert!(c.write_path_token().is_none());

        let token = row.layout().tokenizer().find_token("scores").unwrap().clone();
        let mut c = row.create_cursor();
        assert!(c.find_token(&row, &token));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Delete
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_delete_missing_field_is_noop() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "a");
        row.write_sparse::<i32>(&mut c, 1, UpdateOptions::Upsert).unwrap();
        let before = row.to_byte_array();

        let mut c = cursor_at(&row, "nothing");
        assert!(!c.exists());
        row.delete_sparse(&mut c).unwrap();
        assert_eq!(row.as_bytes(), &before[..]);
    }

    #[test]
    fn test_delete_scope_restores_length() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "keep");
        row.write_sparse::<i32>(&mut c, 11, UpdateOptions::Upsert).unwrap();
        let before = row.len();

        let mut c = cursor_at(&row, "obj");
        let mut obj = row.write_sparse_object(&mut c, UpdateOptions::Upsert).unwrap();
        obj.find(&row, "a");
        row.write_sparse_string(&mut obj, "nested", UpdateOptions::Upsert).unwrap();
        let mut c = cursor_at(&row, "after");
        row.write_sparse::<i32>(&mut c, 22, UpdateOptions::Upsert).unwrap();
        let with_after = row.len();

        let mut c = cursor_at(&row, "obj");
        let size = row.sparse_compute_size(&c);
        row.delete_sparse(&mut c).unwrap();
        assert_eq!(row.len(), with_after - size);
        assert!(!cursor_at(&row, "obj").exists());
        assert_eq!(row.read_sparse::<i32>(&cursor_at(&row, "keep")).unwrap(), 11);
        assert_eq!(row.read_sparse::<i32>(&cursor_at(&row, "after")).unwrap(), 22);

        let mut c = cursor_at(&row, "after");
        row.delete_sparse(&mut c).unwrap();
        assert_eq!(row.len(), before);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Permissions and constraints
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_varuint_above_u32_rejected() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let len = row.len();
        let mut c = cursor_at(&row, "vu");
        assert!(matches!(
            row.write_sparse_varuint(&mut c, u64::from(u32::MAX) + 1, UpdateOptions::Upsert),
            Err(RowError::TooBig { .. })
        ));
        assert_eq!(row.len(), len);
        assert!(!cursor_at(&row, "vu").exists());
    }

    #[test]
    fn test_read_only_cursor_rejects_writes() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "a");
        row.write_sparse::<i32>(&mut c, 1, UpdateOptions::Upsert).unwrap();

        let mut ro = cursor_at(&row, "a").as_read_only();
        assert!(matches!(
            row.write_sparse::<i32>(&mut ro, 2, UpdateOptions::Upsert),
            Err(RowError::InsufficientPermissions)
        ));
        assert!(matches!(row.delete_sparse(&mut ro), Err(RowError::InsufficientPermissions)));
        assert_eq!(row.read_sparse::<i32>(&ro).unwrap(), 1);

        let layout = row.layout().clone();
        let root = row.create_cursor().as_read_only();
        assert!(matches!(
            row.write_fixed_column(&root, layout.try_find("id").unwrap(), 1i32),
            Err(RowError::InsufficientPermissions)
        ));
    }

    #[test]
    fn test_typed_scope_constraints() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "scores");
        let mut scores = row
            .write_typed_array(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        let len = row.len();

        assert!(matches!(
            row.write_sparse_string(&mut scores, "nope", UpdateOptions::Upsert),
            Err(RowError::TypeConstraint)
        ));
        assert_eq!(row.len(), len);

        let mut c = cursor_at(&row, "x");
        assert!(matches!(
            row.write_sparse::<i32>(&mut c, 1, UpdateOptions::InsertAt),
            Err(RowError::TypeConstraint)
        ));
    }

    #[test]
    fn test_too_big_leaves_row_untouched() {
        let ns = namespace();
        let config = RowConfig {
            max_row_size: 64,
            ..RowConfig::default()
        };
        let mut row = new_row_with_config(&ns, config);
        let before = row.to_byte_array();

        let mut c = cursor_at(&row, "blob");
        assert!(matches!(
            row.write_sparse_binary(&mut c, &[0xAB; 100], UpdateOptions::Upsert),
            Err(RowError::TooBig { max: 64, .. })
        ));
        assert_eq!(row.as_bytes(), &before[..]);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Arrays and iteration
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_scores_typed_array() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut root = cursor_at(&row, "scores");
        let mut scores = row
            .write_typed_array(&mut root, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        write_i32s(&mut row, &mut scores, &[1, 2, 3]);
        assert_eq!(scores.count(), 3);

        let root = cursor_at(&row, "scores");
        assert!(root.exists());
        let mut scores = row.read_scope(&root, ScopeKind::TypedArray).unwrap();
        assert_eq!(scores.count(), 3);
        assert_eq!(read_i32s(&row, &mut scores), vec![1, 2, 3]);
        assert!(matches!(
            row.read_scope(&root, ScopeKind::Array),
            Err(RowError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_insert_at_shifts_elements() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "arr");
        let mut arr = row.write_sparse_array(&mut c, UpdateOptions::Upsert).unwrap();
        write_i32s(&mut row, &mut arr, &[1, 3]);
        let mut c = cursor_at(&row, "typed");
        let mut typed = row
            .write_typed_array(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        write_i32s(&mut row, &mut typed, &[1, 3]);

        for (path, kind) in [("arr", ScopeKind::Array), ("typed", ScopeKind::TypedArray)] {
            let c = cursor_at(&row, path);
            let mut scope = row.read_scope(&c, kind).unwrap();
            assert!(scope.move_to(&row, 1));
            row.write_sparse::<i32>(&mut scope, 2, UpdateOptions::InsertAt).unwrap();

            let c = cursor_at(&row, path);
            let mut scope = row.read_scope(&c, kind).unwrap();
            assert_eq!(read_i32s(&row, &mut scope), vec![1, 2, 3], "{path}");
        }

        let c = cursor_at(&row, "typed");
        assert_eq!(row.read_scope(&c, ScopeKind::TypedArray).unwrap().count(), 3);
        let c = cursor_at(&row, "typed");
        let mut typed = row.read_scope(&c, ScopeKind::TypedArray).unwrap();
        assert!(!typed.move_to(&row, 5));
        assert_eq!(typed.cell_type(), Some(LayoutType::EndScope));
    }

    #[test]
    fn test_bool_array_keeps_type_codes() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let args = TypeArgumentList::new(vec![TypeArgument::new(LayoutType::Boolean)]);
        let mut c = cursor_at(&row, "flags");
        let mut flags = row.write_typed_array(&mut c, args, UpdateOptions::Upsert).unwrap();
        for v in [true, false, true] {
            row.write_sparse_bool(&mut flags, v, UpdateOptions::Upsert).unwrap();
            flags.move_next(&row);
        }

        let c = cursor_at(&row, "flags");
        let mut flags = row.read_scope(&c, ScopeKind::TypedArray).unwrap();
        let mut values = Vec::new();
        while flags.move_next(&row) {
            values.push(row.read_sparse_bool(&flags).unwrap());
        }
        assert_eq!(values, vec![true, false, true]);
    }

    #[test]
    fn test_object_iteration_visits_every_field() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "obj");
        let mut obj = row.write_sparse_object(&mut c, UpdateOptions::Upsert).unwrap();
        for (i, path) in ["a", "b", "c", "d"].iter().enumerate() {
            obj.find(&row, path);
            row.write_sparse::<i64>(&mut obj, i as i64, UpdateOptions::Upsert).unwrap();
        }

        let c = cursor_at(&row, "obj");
        let mut obj = row.read_scope(&c, ScopeKind::Object).unwrap();
        let mut seen = Vec::new();
        while obj.move_next(&row) {
            let path = row.read_sparse_path(&obj).unwrap();
            seen.push((path.to_string(), row.read_sparse::<i64>(&obj).unwrap()));
        }
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 2),
                ("d".to_string(), 3)
            ]
        );

        let c = cursor_at(&row, "obj");
        let mut obj = row.read_scope(&c, ScopeKind::Object).unwrap();
        assert!(obj.find(&row, "c"));
        assert_eq!(row.read_sparse::<i64>(&obj).unwrap(), 2);
    }

    #[test]
    fn test_skip_nested_scope() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "outer");
        let mut outer = row.write_sparse_array(&mut c, UpdateOptions::Upsert).unwrap();
        let mut inner = row.write_sparse_array(&mut outer, UpdateOptions::Upsert).unwrap();
        write_i32s(&mut row, &mut inner, &[1, 2]);
        outer.move_next(&row);
        row.write_sparse::<i32>(&mut outer, 9, UpdateOptions::Upsert).unwrap();

        let c = cursor_at(&row, "outer");
        let mut outer = row.read_scope(&c, ScopeKind::Array).unwrap();
        assert!(outer.move_next(&row));
        let mut inner = row.read_scope(&outer, ScopeKind::Array).unwrap();
        assert!(inner.move_next(&row));
        outer.skip(&row, &mut inner);
        assert!(outer.move_next(&row));
        assert_eq!(row.read_sparse::<i32>(&outer).unwrap(), 9);
        assert!(!outer.move_next(&row));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tuples, tagged, nullable, nested schemas
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_tuple_elements_start_null() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let args = TypeArgumentList::new(vec![
            TypeArgument::new(LayoutType::Int32),
            TypeArgument::new(LayoutType::Utf8),
        ]);
        let mut c = cursor_at(&row, "pair");
        let mut pair = row.write_sparse_tuple(&mut c, args, UpdateOptions::Upsert).unwrap();
        assert!(pair.move_next(&row));
        row.read_sparse_null(&pair).unwrap();
        row.write_sparse::<i32>(&mut pair, 5, UpdateOptions::Upsert).unwrap();
        assert!(pair.move_next(&row));
        row.write_sparse_string(&mut pair, "five", UpdateOptions::Upsert).unwrap();

        let c = cursor_at(&row, "pair");
        let mut pair = row.read_scope(&c, ScopeKind::Tuple).unwrap();
        assert!(pair.move_next(&row));
        assert_eq!(row.read_sparse::<i32>(&pair).unwrap(), 5);
        assert!(matches!(row.delete_sparse(&mut pair), Err(RowError::TypeConstraint)));
        assert!(pair.move_next(&row));
        assert_eq!(row.read_sparse_string(&pair).unwrap(), "five");
        assert!(!pair.move_next(&row));
    }

    #[test]
    fn test_typed_tuple_defaults_and_writes() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "tt");
        let mut tt = row
            .write_typed_tuple(&mut c, map_args(), UpdateOptions::Upsert)
            .unwrap();

        assert!(tt.move_next(&row));
        assert_eq!(row.read_sparse_string(&tt).unwrap(), "");
        assert!(matches!(
            row.write_sparse::<i32>(&mut tt, 1, UpdateOptions::Upsert),
            Err(RowError::TypeConstraint)
        ));
        row.write_sparse_string(&mut tt, "key", UpdateOptions::Upsert).unwrap();
        assert!(tt.move_next(&row));
        assert_eq!(row.read_sparse::<i32>(&tt).unwrap(), 0);
        row.write_sparse::<i32>(&mut tt, -1, UpdateOptions::Upsert).unwrap();

        let c = cursor_at(&row, "tt");
        let mut tt = row.read_scope(&c, ScopeKind::TypedTuple).unwrap();
        assert!(tt.move_next(&row));
        assert_eq!(row.read_sparse_string(&tt).unwrap(), "key");
        assert!(tt.move_next(&row));
        assert_eq!(row.read_sparse::<i32>(&tt).unwrap(), -1);
        assert!(!tt.move_next(&row));
    }

    #[test]
    fn test_tagged_value() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let args = TypeArgumentList::tagged(TypeArgument::new(LayoutType::Utf8));
        let mut c = cursor_at(&row, "tagged");
        let mut tagged = row.write_tagged(&mut c, args, UpdateOptions::Upsert).unwrap();
        assert!(tagged.move_next(&row));
        row.write_sparse::<u8>(&mut tagged, 7, UpdateOptions::Upsert).unwrap();
        assert!(tagged.move_next(&row));
        row.write_sparse_string(&mut tagged, "seven", UpdateOptions::Upsert).unwrap();

        let c = cursor_at(&row, "tagged");
        assert_eq!(c.cell_type(), Some(LayoutType::TAGGED));
        let mut tagged = row.read_scope(&c, ScopeKind::Tagged).unwrap();
        assert!(tagged.move_next(&row));
        assert_eq!(row.read_sparse::<u8>(&tagged).unwrap(), 7);
        assert!(tagged.move_next(&row));
        assert_eq!(row.read_sparse_string(&tagged).unwrap(), "seven");
    }

    #[test]
    fn test_nullable_present_and_absent() {
        let ns = namespace();
        let mut row = new_row(&ns);

        let mut c = cursor_at(&row, "some");
        let mut some = row
            .write_nullable(&mut c, int32_args(), true, UpdateOptions::Upsert)
            .unwrap();
        assert!(some.move_next(&row));
        row.write_sparse::<i32>(&mut some, 42, UpdateOptions::Upsert).unwrap();

        let mut c = cursor_at(&row, "none");
        let mut none = row
            .write_nullable(&mut c, int32_args(), false, UpdateOptions::Upsert)
            .unwrap();
        assert!(!none.move_next(&row));

        let c = cursor_at(&row, "some");
        let mut some = row.read_scope(&c, ScopeKind::Nullable).unwrap();
        assert!(some.move_next(&row));
        assert_eq!(row.read_sparse::<i32>(&some).unwrap(), 42);

        let c = cursor_at(&row, "none");
        let mut none = row.read_scope(&c, ScopeKind::Nullable).unwrap();
        assert!(!none.move_next(&row));
        assert_eq!(row.sparse_compute_size(&c), c.value_offset() - c.meta_offset() + 5);
    }

    #[test]
    fn test_nested_schema_has_its_own_bits() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let point = ns.resolve(POINT).unwrap();
        let person = row.layout().clone();

        let mut c = cursor_at(&row, "pt");
        let mut pt = row.write_sparse_udt(&mut c, &point, UpdateOptions::Upsert).unwrap();
        row.write_fixed_column(&pt, point.try_find("y").unwrap(), 9i32).unwrap();
        pt.find(&row, "label");
        row.write_sparse_string(&mut pt, "origin", UpdateOptions::Upsert).unwrap();

        let root = row.create_cursor();
        assert!(matches!(
            row.read_fixed_column::<i32>(&root, person.try_find("id").unwrap()),
            Err(RowError::NotFound)
        ));

        let c = cursor_at(&row, "pt");
        let mut pt = row.read_scope(&c, ScopeKind::Udt).unwrap();
        assert_eq!(pt.layout().schema_id(), POINT);
        assert!(matches!(
            row.read_fixed_column::<i32>(&pt, point.try_find("x").unwrap()),
            Err(RowError::NotFound)
        ));
        assert_eq!(row.read_fixed_column::<i32>(&pt, point.try_find("y").unwrap()).unwrap(), 9);
        assert!(pt.find(&row, "label"));
        assert_eq!(row.read_sparse_string(&pt).unwrap(), "origin");

        let mut c = cursor_at(&row, "via_scope");
        let scope = TypeArgument::with_args(LayoutType::UDT, TypeArgumentList::from_schema_id(POINT));
        let pt = row.write_scope(&mut c, &scope, UpdateOptions::Upsert).unwrap();
        assert_eq!(pt.layout().schema_id(), POINT);
    }

    #[test]
    fn test_default_value_sizes_agree() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let cases = [
            (LayoutType::Null, TypeArgumentList::empty()),
            (LayoutType::Boolean, TypeArgumentList::empty()),
            (LayoutType::Int64, TypeArgumentList::empty()),
            (LayoutType::Utf8, TypeArgumentList::empty()),
            (LayoutType::Guid, TypeArgumentList::empty()),
            (LayoutType::OBJECT, TypeArgumentList::empty()),
            (LayoutType::TYPED_SET, int32_args()),
            (LayoutType::TUPLE, map_args()),
            (LayoutType::TYPED_TUPLE, map_args()),
            (
                LayoutType::TAGGED2,
                TypeArgumentList::tagged2(
                    TypeArgument::new(LayoutType::Boolean),
                    TypeArgument::new(LayoutType::Float64),
                ),
            ),
            (LayoutType::NULLABLE, int32_args()),
            (LayoutType::UDT, TypeArgumentList::from_schema_id(POINT)),
        ];
        for (ty, args) in cases {
            let expected = row.count_default_value(ty, &args);
            let base = row.len();
            row.buf.resize(base + expected + 8, 0xEE);
            assert_eq!(row.write_default_value(base, ty, &args), expected, "{ty}");
            row.buf.truncate(base);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Unique scopes
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_set_rebuild_sorts_elements() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "set");
        let mut set = row
            .write_typed_set(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        assert!(matches!(
            row.write_sparse::<i32>(&mut set, 1, UpdateOptions::Upsert),
            Err(RowError::InsufficientPermissions)
        ));

        set.set_defer_unique_index(true);
        write_i32s(&mut row, &mut set, &[3, 1, 2]);
        row.typed_collection_unique_index_rebuild(&set).unwrap();

        let c = cursor_at(&row, "set");
        let mut set = row.read_scope(&c, ScopeKind::TypedSet).unwrap();
        assert_eq!(read_i32s(&row, &mut set), vec![1, 2, 3]);
    }

    #[test]
    fn test_set_rebuild_rejects_duplicates() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "set");
        let mut set = row
            .write_typed_set(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        set.set_defer_unique_index(true);
        write_i32s(&mut row, &mut set, &[5, 5]);
        let before = row.to_byte_array();

        assert!(matches!(
            row.typed_collection_unique_index_rebuild(&set),
            Err(RowError::Exists)
        ));
        assert_eq!(row.as_bytes(), &before[..]);
    }

    /// Write `value` as a scratch field at the end of the row.
    fn scratch_i32(row: &mut RowBuffer, value: i32) -> RowCursor {
        let mut tmp = row.create_cursor_for_append();
        tmp.find(row, "");
        row.write_sparse(&mut tmp, value, UpdateOptions::Upsert).unwrap();
        tmp
    }

    #[test]
    fn test_set_move_field_keeps_order() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "set");
        let mut set = row
            .write_typed_set(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        let empty_len = row.len();

        for v in [20, 10, 30] {
            let mut tmp = scratch_i32(&mut row, v);
            row.typed_collection_move_field(&mut set, &mut tmp, UpdateOptions::Insert)
                .unwrap();
        }
        assert_eq!(set.count(), 3);
        assert_eq!(row.len(), empty_len + 12);

        let mut tmp = scratch_i32(&mut row, 10);
        assert!(matches!(
            row.typed_collection_move_field(&mut set, &mut tmp, UpdateOptions::Insert),
            Err(RowError::Exists)
        ));
        assert_eq!(row.len(), empty_len + 12);

        let mut tmp = scratch_i32(&mut row, 40);
        assert!(matches!(
            row.typed_collection_move_field(&mut set, &mut tmp, UpdateOptions::Update),
            Err(RowError::NotFound)
        ));
        assert_eq!(row.len(), empty_len + 12);

        let c = cursor_at(&row, "set");
        let mut set = row.read_scope(&c, ScopeKind::TypedSet).unwrap();
        assert_eq!(read_i32s(&row, &mut set), vec![10, 20, 30]);
    }

    #[test]
    fn test_move_into_wrong_type_deletes_source() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "set");
        let mut set = row
            .write_typed_set(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        let len = row.len();

        let mut tmp = row.create_cursor_for_append();
        tmp.find(&row, "");
        row.write_sparse::<i64>(&mut tmp, 1, UpdateOptions::Upsert).unwrap();
        assert!(matches!(
            row.typed_collection_move_field(&mut set, &mut tmp, UpdateOptions::Upsert),
            Err(RowError::TypeConstraint)
        ));
        assert_eq!(row.len(), len);

        let mut gone = row.create_cursor_for_append();
        gone.find(&row, "");
        assert!(matches!(
            row.typed_collection_move_field(&mut set, &mut gone, UpdateOptions::Upsert),
            Err(RowError::NotFound)
        ));
    }

    #[test]
    fn test_move_out_of_typed_array_after_set() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "set");
        row.write_typed_set(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        let mut c = cursor_at(&row, "arr");
        let mut arr = row
            .write_typed_array(&mut c, int32_args(), UpdateOptions::Upsert)
            .unwrap();
        write_i32s(&mut row, &mut arr, &[5, 7]);
        let mut c = cursor_at(&row, "tail");
        row.write_sparse_string(&mut c, "end", UpdateOptions::Upsert).unwrap();
        let len = row.len();

        let c = cursor_at(&row, "set");
        let mut set = row.read_scope(&c, ScopeKind::TypedSet).unwrap();
        let c = cursor_at(&row, "arr");
        let mut arr = row.read_scope(&c, ScopeKind::TypedArray).unwrap();
        assert!(arr.move_next(&row));
        row.typed_collection_move_field(&mut set, &mut arr, UpdateOptions::Upsert)
            .unwrap();
        assert_eq!(set.count(), 1);
        assert_eq!(row.len(), len);

        let c = cursor_at(&row, "set");
        let mut set = row.read_scope(&c, ScopeKind::TypedSet).unwrap();
        assert_eq!(read_i32s(&row, &mut set), vec![5]);

        let c = cursor_at(&row, "arr");
        assert!(c.exists());
        assert_eq!(row.read_sparse_path(&c).unwrap(), "arr");
        let mut arr = row.read_scope(&c, ScopeKind::TypedArray).unwrap();
        assert_eq!(arr.count(), 1);
        assert_eq!(read_i32s(&row, &mut arr), vec![7]);
        assert_eq!(row.read_sparse_string(&cursor_at(&row, "tail")).unwrap(), "end");
    }

    /// Write a `(key, value)` map entry as a scratch field at the end of the row.
    fn scratch_entry(row: &mut RowBuffer, key: &str, value: i32) -> RowCursor {
        let mut tmp = row.create_cursor_for_append();
        tmp.find(row, "");
        let mut entry = row
            .write_typed_tuple(&mut tmp, map_args(), UpdateOptions::Upsert)
            .unwrap();
        entry.move_next(row);
        row.write_sparse_string(&mut entry, key, UpdateOptions::Upsert).unwrap();
        entry.move_next(row);
        row.write_sparse(&mut entry, value, UpdateOptions::Upsert).unwrap();
        tmp
    }

    fn read_map(row: &RowBuffer, path: &str) -> Vec<(String, i32)> {
        let c = cursor_at(row, path);
        let mut map = row.read_scope(&c, ScopeKind::TypedMap).unwrap();
        let mut entries = Vec::new();
        while map.move_next(row) {
            let mut entry = row.read_scope(&map, ScopeKind::TypedTuple).unwrap();
            assert!(entry.move_next(row));
            let key = row.read_sparse_string(&entry).unwrap().to_string();
            assert!(entry.move_next(row));
            entries.push((key, row.read_sparse::<i32>(&entry).unwrap()));
        }
        entries
    }

    #[test]
    fn test_map_upsert_via_move() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "map");
        let mut map = row
            .write_typed_map(&mut c, map_args(), UpdateOptions::Upsert)
            .unwrap();

        let mut tmp = scratch_entry(&mut row, "k", 1);
        row.typed_collection_move_field(&mut map, &mut tmp, UpdateOptions::Upsert)
            .unwrap();
        let mut tmp = scratch_entry(&mut row, "a", 5);
        row.typed_collection_move_field(&mut map, &mut tmp, UpdateOptions::Upsert)
            .unwrap();
        assert_eq!(read_map(&row, "map"), vec![("a".to_string(), 5), ("k".to_string(), 1)]);

        let mut tmp = scratch_entry(&mut row, "k", 2);
        row.typed_collection_move_field(&mut map, &mut tmp, UpdateOptions::Upsert)
            .unwrap();
        assert_eq!(map.count(), 2);
        assert_eq!(read_map(&row, "map"), vec![("a".to_string(), 5), ("k".to_string(), 2)]);

        let mut tmp = scratch_entry(&mut row, "a", 0);
        assert!(matches!(
            row.typed_collection_move_field(&mut map, &mut tmp, UpdateOptions::Insert),
            Err(RowError::Exists)
        ));
        assert_eq!(read_map(&row, "map"), vec![("a".to_string(), 5), ("k".to_string(), 2)]);
    }

    #[test]
    fn test_map_rebuild_orders_by_key() {
        let ns = namespace();
        let mut row = new_row(&ns);
        let mut c = cursor_at(&row, "map");
        let mut map = row
            .write_typed_map(&mut c, map_args(), UpdateOptions::Upsert)
            .unwrap();
        map.set_defer_unique_index(true);
        for (key, value) in [("b", 2), ("c", 3), ("a", 1)] {
            let mut entry = row.write_typed_tuple(&mut map, map_args(), UpdateOptions::Upsert).unwrap();
            entry.move_next(&row);
            row.write_sparse_string(&mut entry, key, UpdateOptions::Upsert).unwrap();
            entry.move_next(&row);
            row.write_sparse(&mut entry, value, UpdateOptions::Upsert).unwrap();
            map.move_next(&row);
        }
        row.typed_collection_unique_index_rebuild(&map).unwrap();
        assert_eq!(
            read_map(&row, "map"),
            vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)]
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════════

    proptest! {
        #[test]
        fn prop_insert_then_delete_restores_length(values in prop::collection::vec(any::<i64>(), 1..16)) {
            let ns = namespace();
            let mut row = new_row(&ns);
            let base = row.len();

            for (i, v) in values.iter().enumerate() {
                let mut c = cursor_at(&row, &format!("f{i}"));
                row.write_sparse_varint(&mut c, *v, UpdateOptions::Insert).unwrap();
            }
            for (i, v) in values.iter().enumerate() {
                let c = cursor_at(&row, &format!("f{i}"));
                prop_assert_eq!(row.read_sparse_varint(&c).unwrap(), *v);
            }
            for i in (0..values.len()).rev() {
                let mut c = cursor_at(&row, &format!("f{i}"));
                let before = row.len();
                let size = row.sparse_compute_size(&c);
                row.delete_sparse(&mut c).unwrap();
                prop_assert_eq!(row.len(), before - size);
            }
            prop_assert_eq!(row.len(), base);
        }

        #[test]
        fn prop_object_iteration_covers_scope(fields in prop::collection::vec((0u8..5, any::<i32>()), 0..12)) {
            let ns = namespace();
            let mut row = new_row(&ns);
            let mut c = cursor_at(&row, "obj");
            let mut obj = row.write_sparse_object(&mut c, UpdateOptions::Upsert).unwrap();
            for (i, &(kind, v)) in fields.iter().enumerate() {
                obj.find(&row, &format!("f{i}"));
                match kind {
                    0 => row.write_sparse(&mut obj, v, UpdateOptions::Upsert).unwrap(),
                    1 => row.write_sparse_varint(&mut obj, i64::from(v), UpdateOptions::Upsert).unwrap(),
                    2 => {
                        let s = "x".repeat((v.unsigned_abs() % 20) as usize);
                        row.write_sparse_string(&mut obj, &s, UpdateOptions::Upsert).unwrap();
                    }
                    3 => row.write_sparse_bool(&mut obj, v % 2 == 0, UpdateOptions::Upsert).unwrap(),
                    _ => {
                        let mut arr = row
                            .write_typed_array(&mut obj, int32_args(), UpdateOptions::Upsert)
                            .unwrap();
                        let n = (v.unsigned_abs() % 5) as i32;
                        write_i32s(&mut row, &mut arr, &(0..n).collect::<Vec<_>>());
                    }
                }
            }

            let c = cursor_at(&row, "obj");
            let mut obj = row.read_scope(&c, ScopeKind::Object).unwrap();
            let mut visited = 0;
            let mut total = 0;
            while obj.move_next(&row) {
                visited += 1;
                total += row.sparse_compute_size(&obj);
            }
            prop_assert_eq!(visited, fields.len());
            prop_assert!(!obj.move_next(&row));
            prop_assert_eq!(total, obj.meta_offset() - obj.start());
            prop_assert_eq!(row.as_bytes()[obj.meta_offset()], LayoutCode::EndScope as u8);
        }

        #[test]
        fn prop_typed_array_iteration_covers_scope(values in prop::collection::vec(any::<i32>(), 0..24)) {
            let ns = namespace();
            let mut row = new_row(&ns);
            let mut c = cursor_at(&row, "scores");
            let mut scores = row
                .write_typed_array(&mut c, int32_args(), UpdateOptions::Upsert)
                .unwrap();
            write_i32s(&mut row, &mut scores, &values);

            let c = cursor_at(&row, "scores");
            let mut scores = row.read_scope(&c, ScopeKind::TypedArray).unwrap();
            let mut visited = 0;
            let mut total = 0;
            while scores.move_next(&row) {
                visited += 1;
                total += row.sparse_compute_size(&scores);
            }
            prop_assert_eq!(visited, values.len());
            prop_assert!(!scores.move_next(&row));
            prop_assert_eq!(total, scores.meta_offset() - scores.start() - SIZE_PREFIX_LEN);
        }
    }
}
