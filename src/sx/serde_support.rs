use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::float::Float;
use crate::function::FunctionConfig;
use crate::opcode::{self, OpCode};
use crate::sparsity::Sparsity;

use super::{SxFunction, SxTape};

impl<F: Float + Serialize> Serialize for SxTape<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SxTape", 4)?;
        s.serialize_field("opcodes", &self.opcodes)?;
        s.serialize_field("arg_indices", &self.arg_indices)?;
        s.serialize_field("values", &self.values)?;
        s.serialize_field("num_inputs", &self.num_inputs)?;
        s.end()
    }
}

impl<'de, F: Float + Deserialize<'de>> Deserialize<'de> for SxTape<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct TapeData<F> {
            opcodes: Vec<OpCode>,
            arg_indices: Vec<[u32; 2]>,
            values: Vec<F>,
            num_inputs: u32,
        }

        let data = TapeData::<F>::deserialize(deserializer)?;
        let tape = SxTape {
            opcodes: data.opcodes,
            arg_indices: data.arg_indices,
            values: data.values,
            num_inputs: data.num_inputs,
        };
        validate(&tape).map_err(serde::de::Error::custom)?;
        Ok(tape)
    }
}

/// Operands must point strictly backwards, and the input count must match.
fn validate<F: Float>(tape: &SxTape<F>) -> Result<(), String> {
    let n = tape.opcodes.len();
    if tape.arg_indices.len() != n || tape.values.len() != n {
        return Err("tape columns have different lengths".to_string());
    }
    let inputs = tape.opcodes.iter().filter(|&&op| op == OpCode::Input).count();
    if inputs != tape.num_inputs as usize {
        return Err(format!(
            "tape declares {} inputs but records {inputs}",
            tape.num_inputs
        ));
    }
    for i in 0..n {
        let [a, b] = tape.arg_indices[i];
        let ok = match tape.opcodes[i] {
            OpCode::Input | OpCode::Const => true,
            op if opcode::is_binary(op) => (a as usize) < i && (b as usize) < i,
            _ => (a as usize) < i,
        };
        if !ok {
            return Err(format!("entry {i} references a later entry"));
        }
    }
    Ok(())
}

impl<F: Float + Serialize> Serialize for SxFunction<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SxFunction", 6)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("tape", &self.tape)?;
        s.serialize_field("in_sp", &self.in_sp)?;
        s.serialize_field("out_sp", &self.out_sp)?;
        s.serialize_field("outputs", &self.outputs)?;
        s.serialize_field("max_batch", &self.config.max_batch)?;
        s.end()
    }
}

impl<'de, F: Float + Deserialize<'de>> Deserialize<'de> for SxFunction<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(bound(deserialize = "F: Float + Deserialize<'de>"))]
        struct FunctionData<F: Float> {
            name: String,
            tape: SxTape<F>,
            in_sp: Vec<Sparsity>,
            out_sp: Vec<Sparsity>,
            outputs: Vec<Vec<u32>>,
            #[serde(default)]
            max_batch: Option<usize>,
        }

        let data = FunctionData::<F>::deserialize(deserializer)?;
        let mut config = FunctionConfig::default();
        if let Some(max_batch) = data.max_batch {
            config.max_batch = max_batch;
        }
        let f = SxFunction::from_tape(data.name, data.tape, data.in_sp, data.out_sp, data.outputs)
            .map_err(serde::de::Error::custom)?;
        Ok(f.with_config(config))
    }
}
