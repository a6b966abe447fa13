use spool_observability::{Counter, Histogram};

pub struct PipelineMetrics {
    pub input_lines: Counter<u64>,
    pub decode_errors: Counter<u64>,
    pub delivered_batches: Counter<u64>,
    pub delivered_rows: Counter<u64>,
    pub dropped_rows: Counter<u64>,
    pub batch_size: Histogram<u64>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        let meter = spool_observability::meter("pipeline");
        Self {
            input_lines: meter
                .u64_counter("spool.input.lines")
                .with_unit("{line}")
                .with_description("number of input lines read")
                .build(),
            decode_errors: meter
                .u64_counter("spool.input.decode_errors")
                .with_unit("{line}")
                .with_description("number of input lines that failed to decode")
                .build(),
            delivered_batches: meter
                .u64_counter("spool.sink.batches")
                .with_unit("{batch}")
                .with_description("number of batches delivered to the sink")
                .build(),
            delivered_rows: meter
                .u64_counter("spool.sink.rows")
                .with_unit("{row}")
                .with_description("number of rows delivered to the sink")
                .build(),
            dropped_rows: meter
                .u64_counter("spool.sink.dropped_rows")
                .with_unit("{row}")
                .with_description("number of rows dropped after a sink failure")
                .build(),
            batch_size: meter
                .u64_histogram("spool.sink.batch_size")
                .with_unit("{row}")
                .with_description("number of rows per delivered batch")
                .build(),
        }
    }
}
